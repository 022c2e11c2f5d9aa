use serde::{Deserialize, Serialize};

use super::DeviceId;

/// Bearer token issued by the monitoring API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Returns `None` for an empty token.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Serialize)]
pub struct AuthRequest<'a> {
    pub login: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyObject {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub devices: Vec<ObjectDevice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectDevice {
    pub id: DeviceId,
    pub name: String,
}
