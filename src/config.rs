use std::env;
use std::time::Duration;

use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub monitoring: MonitoringConfig,
    pub telegram: TelegramConfig,
    pub scheduler: SchedulerConfig,
    pub alarms: AlarmConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub base_url: String,
    pub admin_login: String,
    pub admin_password: String,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub subscription_refresh_interval: Duration,
    pub lock_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct AlarmConfig {
    pub timezone: Tz,
    /// Alarm kinds worth a notification. Empty means every alarm.
    pub targeted: Vec<String>,
    pub reauthorize_message: String,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Yekaterinburg,
            targeted: Vec::new(),
            reauthorize_message: DEFAULT_REAUTHORIZE_MESSAGE.to_string(),
        }
    }
}

const DEFAULT_REAUTHORIZE_MESSAGE: &str =
    "Your monitoring account could not be verified. Please authorize again to keep receiving alarms.";

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("SERVER_PORT", 8080),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                admin_token: env::var("ADMIN_API_TOKEN").ok().filter(|t| !t.is_empty()),
            },
            database: DatabaseConfig {
                host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: parsed("DB_PORT", 5432),
                user: env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
                password: env::var("DB_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
                database: env::var("DB_NAME").unwrap_or_else(|_| "alarm_notifier".to_string()),
                ssl_mode: env::var("DB_SSL_MODE").unwrap_or_else(|_| "disable".to_string()),
                max_connections: parsed("DB_MAX_CONNS", 10),
            },
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: parsed("REDIS_PORT", 6379),
                password: env::var("REDIS_PASSWORD").ok(),
                db: parsed("REDIS_DB", 0),
            },
            monitoring: MonitoringConfig {
                base_url: env::var("MONITORING_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8888".to_string()),
                admin_login: env::var("MONITORING_ADMIN_LOGIN").unwrap_or_default(),
                admin_password: env::var("MONITORING_ADMIN_PASSWORD").unwrap_or_default(),
                request_timeout: Duration::from_secs(parsed("MONITORING_TIMEOUT_SECS", 30)),
                max_concurrent_requests: parsed("MONITORING_MAX_CONCURRENCY", 10),
            },
            telegram: TelegramConfig {
                api_base: env::var("TELEGRAM_API_BASE")
                    .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
                bot_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
                max_concurrent_requests: parsed("TELEGRAM_MAX_CONCURRENCY", 10),
            },
            scheduler: SchedulerConfig {
                poll_interval: Duration::from_secs(parsed("POLL_INTERVAL_SECS", 60)),
                subscription_refresh_interval: Duration::from_secs(parsed(
                    "SUBSCRIPTION_REFRESH_INTERVAL_SECS",
                    24 * 60 * 60, // 1 day
                )),
                lock_ttl: Duration::from_secs(parsed("JOB_LOCK_TTL_SECS", 5 * 60)),
            },
            alarms: AlarmConfig {
                timezone: env::var("TIMEZONE")
                    .ok()
                    .and_then(|tz| tz.parse().ok())
                    .unwrap_or(chrono_tz::Asia::Yekaterinburg),
                targeted: env::var("TARGETED_ALARMS")
                    .map(|raw| split_list(&raw))
                    .unwrap_or_default(),
                reauthorize_message: env::var("REAUTHORIZE_MESSAGE")
                    .unwrap_or_else(|_| DEFAULT_REAUTHORIZE_MESSAGE.to_string()),
            },
        }
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.database.user,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database,
            self.database.ssl_mode
        )
    }

    pub fn redis_url(&self) -> String {
        match &self.redis.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis.host, self.redis.port, self.redis.db
            ),
            None => format!(
                "redis://{}:{}/{}",
                self.redis.host, self.redis.port, self.redis.db
            ),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Splits a `;`-separated list, dropping blank entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_skips_blanks() {
        assert_eq!(
            split_list(" Leak detected ; ;Fire detected;"),
            vec!["Leak detected".to_string(), "Fire detected".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn parsed_falls_back_on_missing_key() {
        assert_eq!(parsed("ALARM_NOTIFIER_TEST_UNSET_KEY", 42u64), 42);
    }
}
