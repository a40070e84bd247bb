//! Process configuration: optional TOML file, then environment overrides.
//!
//! | Variable                | Default            |
//! |-------------------------|--------------------|
//! | `BIZDESK_CONFIG`        | none (file path)   |
//! | `BIZDESK_BIND`          | `0.0.0.0:8080`     |
//! | `JWT_SECRET`            | insecure dev value |
//! | `DATABASE_URL`          | none               |
//! | `USE_PERSISTENT_STORES` | `false`            |
//! | `LOG_FORMAT`            | `json`             |
//! | `SENDGRID_API_KEY`      | none (outbox)      |
//! | `MAIL_FROM`             | `no-reply@bizdesk.local` |
//! | `DOCUMENT_STORE_DIR`    | none (in memory)   |
//! | `COMPANY_NAME`          | `Bizdesk`          |

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use bizdesk_observability::LogFormat;

use crate::external::CompanyProfile;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_MAIL_FROM: &str = "no-reply@bizdesk.local";
pub const DEFAULT_COMPANY_NAME: &str = "Bizdesk";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse config file: {0}")]
    Parse(String),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    bind: Option<String>,
    jwt_secret: Option<String>,
    database_url: Option<String>,
    use_persistent_stores: Option<bool>,
    log_format: Option<LogFormat>,
    email: FileEmail,
    documents: FileDocuments,
    company: Option<CompanyProfile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileEmail {
    sendgrid_api_key: Option<String>,
    from: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileDocuments {
    store_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    /// `None` keeps mail in the in-memory outbox.
    pub sendgrid_api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
    pub log_format: LogFormat,
    pub email: EmailConfig,
    /// `None` keeps generated documents in memory.
    pub document_store_dir: Option<PathBuf>,
    pub company: CompanyProfile,
}

impl AppConfig {
    /// Settings for tests and local runs: in-memory everything.
    pub fn for_development() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            database_url: None,
            use_persistent_stores: false,
            log_format: LogFormat::Pretty,
            email: EmailConfig {
                sendgrid_api_key: None,
                from: DEFAULT_MAIL_FROM.to_string(),
            },
            document_store_dir: None,
            company: CompanyProfile {
                name: DEFAULT_COMPANY_NAME.to_string(),
                ..CompanyProfile::default()
            },
        }
    }

    /// Read `BIZDESK_CONFIG` (if set) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var("BIZDESK_CONFIG") {
            Ok(path) => Some(std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
                path: path.clone(),
                message: e.to_string(),
            })?),
            Err(_) => None,
        };
        Self::load(file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Merge an optional TOML document with variables from `env`; variables win.
    pub fn load(toml_text: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file: FileConfig = match toml_text {
            Some(text) => toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?,
            None => FileConfig::default(),
        };
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let bind_raw = env("BIZDESK_BIND")
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            key: "BIZDESK_BIND",
            message: format!("'{bind_raw}': {e}"),
        })?;

        let jwt_secret = env("JWT_SECRET").or(file.jwt_secret).unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let use_persistent_stores = match env("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool(&v).ok_or_else(|| ConfigError::Invalid {
                key: "USE_PERSISTENT_STORES",
                message: format!("'{v}' is not a boolean"),
            })?,
            None => file.use_persistent_stores.unwrap_or(false),
        };
        let database_url = env("DATABASE_URL").or(file.database_url);
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Invalid {
                key: "DATABASE_URL",
                message: "required when USE_PERSISTENT_STORES is set".to_string(),
            });
        }

        let log_format = match env("LOG_FORMAT") {
            Some(v) => v.parse::<LogFormat>().map_err(|message| ConfigError::Invalid {
                key: "LOG_FORMAT",
                message,
            })?,
            None => file.log_format.unwrap_or_default(),
        };

        let sendgrid_api_key = env("SENDGRID_API_KEY").or(file.email.sendgrid_api_key);
        if sendgrid_api_key.is_none() {
            tracing::warn!("SENDGRID_API_KEY not set; outgoing mail stays in the in-memory outbox");
        }
        let email = EmailConfig {
            sendgrid_api_key,
            from: env("MAIL_FROM")
                .or(file.email.from)
                .unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
        };

        let mut company = file.company.unwrap_or_default();
        if let Some(name) = env("COMPANY_NAME") {
            company.name = name;
        }
        if company.name.trim().is_empty() {
            company.name = DEFAULT_COMPANY_NAME.to_string();
        }

        Ok(Self {
            bind,
            jwt_secret,
            database_url,
            use_persistent_stores,
            log_format,
            email,
            document_store_dir: env("DOCUMENT_STORE_DIR")
                .map(PathBuf::from)
                .or(file.documents.store_dir),
            company,
        })
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
