//! Client for the device-monitoring API.
//!
//! Every request goes through the monitoring [`ConcurrencyLimiter`], so a
//! cycle can issue one fetch per tracked device at once without flooding
//! the upstream service.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{Client, Response, StatusCode};

use super::limiter::ConcurrencyLimiter;
use crate::{
    config::MonitoringConfig,
    error::{AppError, AppResult},
    models::{
        AccessToken, AlarmEvent, AlarmWindow, AuthRequest, AuthResponse, Company, CompanyObject,
        Device, DeviceId,
    },
};

const SERVICE: &str = "monitoring API";
const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// `Ok(None)` when the API rejects the credentials.
    async fn authenticate(&self, login: &str, password: &str) -> AppResult<Option<AccessToken>>;

    /// Every device reachable with `token`, across all its companies.
    async fn fetch_tracked_device_universe(&self, token: &AccessToken)
        -> AppResult<HashSet<Device>>;

    /// Alarm history of one device, in API order.
    async fn fetch_alarm_events(
        &self,
        device_id: DeviceId,
        token: &AccessToken,
        window: &AlarmWindow,
    ) -> AppResult<Vec<AlarmEvent>>;
}

#[derive(Clone)]
pub struct MonitoringClient {
    http: Client,
    base_url: String,
    limiter: ConcurrencyLimiter,
}

impl MonitoringClient {
    pub fn new(config: &MonitoringConfig) -> AppResult<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        let limiter = ConcurrencyLimiter::new("monitoring", config.max_concurrent_requests);
        tracing::debug!(
            "Monitoring API at {} limited to {} concurrent requests",
            config.base_url,
            limiter.capacity()
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_companies(&self, token: &AccessToken) -> AppResult<Vec<Company>> {
        self.limiter
            .run(async {
                let response = self
                    .http
                    .get(self.url("/api2/company"))
                    .bearer_auth(token.as_str())
                    .send()
                    .await?;

                Ok::<_, AppError>(ensure_success(response).await?.json().await?)
            })
            .await
    }

    async fn fetch_company_devices(
        &self,
        company_id: i64,
        token: &AccessToken,
    ) -> AppResult<Vec<Device>> {
        let objects: Vec<CompanyObject> = self
            .limiter
            .run(async {
                let response = self
                    .http
                    .get(self.url("/api2/company/objects"))
                    .query(&[("id", company_id)])
                    .bearer_auth(token.as_str())
                    .send()
                    .await?;

                // No access to this company's objects
                if response.status() == StatusCode::FORBIDDEN {
                    return Ok(Vec::new());
                }

                Ok::<_, AppError>(ensure_success(response).await?.json().await?)
            })
            .await?;

        Ok(objects
            .into_iter()
            .flat_map(|object| {
                let CompanyObject {
                    name,
                    address,
                    devices,
                } = object;
                devices.into_iter().map(move |device| Device {
                    id: device.id,
                    name: device.name,
                    object_name: name.clone(),
                    object_address: address.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl MonitoringApi for MonitoringClient {
    async fn authenticate(&self, login: &str, password: &str) -> AppResult<Option<AccessToken>> {
        self.limiter
            .run(async {
                let response = self
                    .http
                    .post(self.url("/api2/auth/open"))
                    .json(&AuthRequest { login, password })
                    .send()
                    .await?;

                if response.status() == StatusCode::UNAUTHORIZED {
                    return Ok(None);
                }

                let auth: AuthResponse = ensure_success(response).await?.json().await?;
                let token = auth
                    .token
                    .and_then(AccessToken::new)
                    .ok_or(AppError::EmptyAccessToken)?;

                Ok::<_, AppError>(Some(token))
            })
            .await
    }

    async fn fetch_tracked_device_universe(
        &self,
        token: &AccessToken,
    ) -> AppResult<HashSet<Device>> {
        let companies = self.fetch_companies(token).await?;

        let per_company = try_join_all(
            companies
                .iter()
                .map(|company| self.fetch_company_devices(company.id, token)),
        )
        .await?;

        Ok(per_company.into_iter().flatten().collect())
    }

    async fn fetch_alarm_events(
        &self,
        device_id: DeviceId,
        token: &AccessToken,
        window: &AlarmWindow,
    ) -> AppResult<Vec<AlarmEvent>> {
        self.limiter
            .run(async {
                let response = self
                    .http
                    .get(self.url("/api2/device/limit-log"))
                    .query(&[
                        ("id", device_id.to_string()),
                        ("start_dt", window.start.format(WINDOW_FORMAT).to_string()),
                        ("end_dt", window.end.format(WINDOW_FORMAT).to_string()),
                    ])
                    .bearer_auth(token.as_str())
                    .send()
                    .await?;

                Ok::<_, AppError>(ensure_success(response).await?.json().await?)
            })
            .await
    }
}

async fn ensure_success(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let path = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(
        status = %status,
        path = %path,
        body = %body,
        "[{}] request failed",
        SERVICE
    );

    Err(AppError::Upstream {
        service: SERVICE,
        status: status.as_u16(),
        body,
    })
}
