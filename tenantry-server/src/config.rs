use serde::Deserialize;

use crate::response::{ServerError, ServerResult};

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Shared HS256 secret of the token issuer.
    pub secret: String,
    /// Expected `iss` claim; unchecked when unset.
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum MailDriver {
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub mongo_uri: String,
    pub mongo_db: String,
    pub rest_port: u16,
    pub jwt: JwtConfig,
    pub admin_emails: Vec<String>,
    pub public_url: String,
    pub log_level: String,
    pub mail_driver: MailDriver,
}

impl AppConfig {
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mongo_uri = var("MONGO_URI", "mongodb://localhost:27017");
        let mongo_db = var("MONGO_DB", "tenantry");

        let rest_port = var("REST_PORT", "8080");
        let rest_port = rest_port
            .trim()
            .parse::<u16>()
            .map_err(|_| ServerError::internal_error(&format!("invalid REST_PORT: {rest_port}")))?;

        let secret = var("JWT_SECRET", "change_me_in_prod");
        let issuer = lookup("JWT_ISSUER").filter(|s| !s.trim().is_empty());

        let admin_emails = var("ADMIN_EMAILS", "")
            .split(',')
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let public_url = var("PUBLIC_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();
        let log_level = var("LOG_LEVEL", "info");

        let mail_driver = match var("MAIL_DRIVER", "log").to_lowercase().as_str() {
            "log" => MailDriver::Log,
            other => {
                return Err(ServerError::internal_error(&format!(
                    "unsupported MAIL_DRIVER: {other}"
                )));
            }
        };

        Ok(Self {
            mongo_uri,
            mongo_db,
            rest_port,
            jwt: JwtConfig { secret, issuer },
            admin_emails,
            public_url,
            log_level,
            mail_driver,
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }
}
