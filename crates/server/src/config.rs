//! Server settings read from the environment (and `.env`, loaded by `main`).

use services::services::{
    payfast::PayFastConfig,
    paypal::{PayPalConfig, PayPalMode},
};
use thiserror::Error;
use tracing::warn;
use utils::{assets::default_database_path, logging::LogFormat};

const DEV_SECURESIGN_SECRET: &str = "seedwave-dev-securesign-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{set} is set but {missing} is not")]
    Incomplete {
        set: &'static str,
        missing: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Empty means any origin is allowed.
    pub cors_allowed_origins: Vec<String>,
    pub log_format: LogFormat,
    pub paypal: Option<PayPalConfig>,
    pub payfast: Option<PayFastConfig>,
    pub securesign_secret: String,
    pub payment_currency: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_url: format!("sqlite://{}", default_database_path().display()),
            cors_allowed_origins: Vec::new(),
            log_format: LogFormat::Pretty,
            paypal: None,
            payfast: None,
            securesign_secret: DEV_SECURESIGN_SECRET.to_string(),
            payment_currency: "ZAR".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            None => defaults.port,
        };

        let log_format = LogFormat::parse(get("LOG_FORMAT").as_deref());

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().trim_end_matches('/').to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let production = get("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let securesign_secret = match get("SECURESIGN_SECRET") {
            Some(secret) => secret,
            None if production => return Err(ConfigError::Missing("SECURESIGN_SECRET")),
            None => {
                warn!("SECURESIGN_SECRET is not set; using the development signing secret");
                DEV_SECURESIGN_SECRET.to_string()
            }
        };

        let paypal = match (get("PAYPAL_CLIENT_ID"), get("PAYPAL_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => {
                let mode = match get("PAYPAL_MODE") {
                    Some(raw) => raw.parse::<PayPalMode>().map_err(|_| ConfigError::Invalid {
                        name: "PAYPAL_MODE",
                        value: raw,
                    })?,
                    None => PayPalMode::default(),
                };
                Some(PayPalConfig {
                    client_id,
                    client_secret,
                    mode,
                })
            }
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    set: "PAYPAL_CLIENT_ID",
                    missing: "PAYPAL_CLIENT_SECRET",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete {
                    set: "PAYPAL_CLIENT_SECRET",
                    missing: "PAYPAL_CLIENT_ID",
                });
            }
            (None, None) => None,
        };

        let payfast = match (get("PAYFAST_MERCHANT_ID"), get("PAYFAST_MERCHANT_KEY")) {
            (Some(merchant_id), Some(merchant_key)) => Some(PayFastConfig {
                merchant_id,
                merchant_key,
                passphrase: get("PAYFAST_PASSPHRASE"),
                sandbox: parse_bool(&get, "PAYFAST_SANDBOX", true)?,
                return_url: get("PAYFAST_RETURN_URL"),
                cancel_url: get("PAYFAST_CANCEL_URL"),
                notify_url: get("PAYFAST_NOTIFY_URL"),
                validate_with_server: parse_bool(&get, "PAYFAST_VALIDATE_WITH_SERVER", false)?,
            }),
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    set: "PAYFAST_MERCHANT_ID",
                    missing: "PAYFAST_MERCHANT_KEY",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete {
                    set: "PAYFAST_MERCHANT_KEY",
                    missing: "PAYFAST_MERCHANT_ID",
                });
            }
            (None, None) => None,
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            cors_allowed_origins,
            log_format,
            paypal,
            payfast,
            securesign_secret,
            payment_currency: get("PAYMENT_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or(defaults.payment_currency),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = get(name) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { name, value: raw }),
    }
}
