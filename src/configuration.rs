use config::ConfigError;

use crate::auth::{DEFAULT_AUDIENCE, DEFAULT_ISSUER};

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    pub email_client: Option<EmailClientSettings>,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Production mode: cookies become `Secure` and `SameSite=Strict`.
    #[serde(default)]
    pub production: bool,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT signing settings. Access and refresh tokens use distinct secrets.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    /// seconds
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64,
    /// seconds
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
}

impl JwtSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.is_empty() || self.refresh_secret.is_empty() {
            return Err(ConfigError::Message(
                "jwt.access_secret and jwt.refresh_secret must be set".to_string(),
            ));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::Message(
                "jwt.access_secret and jwt.refresh_secret must differ".to_string(),
            ));
        }
        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(ConfigError::Message(
                "jwt token expiries must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct AuthSettings {
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    /// seconds
    #[serde(default = "default_reset_token_expiry")]
    pub reset_token_expiry: i64,
    /// seconds between two ledger sweeps
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl AuthSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reset_token_expiry <= 0 {
            return Err(ConfigError::Message(
                "auth.reset_token_expiry must be positive".to_string(),
            ));
        }
        if self.cleanup_interval == 0 {
            return Err(ConfigError::Message(
                "auth.cleanup_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
            reset_token_expiry: default_reset_token_expiry(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

/// Outbound email API used to deliver password reset links.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
    pub authorization_token: String,
    #[serde(default = "default_email_timeout")]
    pub timeout_milliseconds: u64,
    /// Link sent to the user, the token is appended as `?token=...`.
    pub reset_url: String,
}

impl EmailClientSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_milliseconds)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_access_token_expiry() -> i64 {
    30 * 60
}

fn default_refresh_token_expiry() -> i64 {
    7 * 24 * 60 * 60
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

fn default_audience() -> String {
    DEFAULT_AUDIENCE.to_string()
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_reset_token_expiry() -> i64 {
    60 * 60
}

fn default_cleanup_interval() -> u64 {
    6 * 60 * 60
}

fn default_email_timeout() -> u64 {
    10_000
}

/// Loads `configuration.{yaml,toml,json}` if present, then applies
/// `APP_`-prefixed environment overrides, e.g. `APP_JWT__ACCESS_SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.jwt.validate()?;
    settings.auth.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            access_secret: "access-secret".to_string(),
            refresh_secret: "refresh-secret".to_string(),
            access_token_expiry: default_access_token_expiry(),
            refresh_token_expiry: default_refresh_token_expiry(),
            issuer: default_issuer(),
            audience: default_audience(),
        }
    }

    #[test]
    fn test_distinct_secrets_are_accepted() {
        assert!(jwt_settings().validate().is_ok());
    }

    #[test]
    fn test_shared_secret_is_rejected() {
        let mut settings = jwt_settings();
        settings.refresh_secret = settings.access_secret.clone();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_cleanup_interval_is_rejected() {
        let auth = AuthSettings {
            cleanup_interval: 0,
            ..AuthSettings::default()
        };
        assert!(auth.validate().is_err());
    }

    #[test]
    fn test_non_positive_reset_expiry_is_rejected() {
        for reset_token_expiry in [0, -60] {
            let auth = AuthSettings {
                reset_token_expiry,
                ..AuthSettings::default()
            };
            assert!(auth.validate().is_err());
        }
        assert!(AuthSettings::default().validate().is_ok());
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let mut settings = jwt_settings();
        settings.access_secret = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let auth = AuthSettings::default();
        assert!(auth.bcrypt_cost >= 10);
        assert_eq!(auth.reset_token_expiry, 3600);
        assert_eq!(auth.cleanup_interval, 21600);
        assert_eq!(default_access_token_expiry(), 1800);
        assert_eq!(default_refresh_token_expiry(), 604800);
    }
}
