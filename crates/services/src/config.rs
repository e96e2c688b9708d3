use std::env;

use poise_core::model::{AppSettings, AppSettingsDraft, UserId};

use crate::error::ConfigError;

pub const DEFAULT_DB_URL: &str = "sqlite:poise.sqlite3";

/// Runtime configuration assembled from the environment and CLI overrides.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub db_url: String,
    pub settings: AppSettings,
}

impl AppConfig {
    /// Read `POISE_DB_URL`, `POISE_USER_ID`, `POISE_ANALYTICS_URL` and
    /// `POISE_ANALYTICS_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a present value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_values(
            env::var("POISE_DB_URL").ok(),
            AppSettingsDraft {
                user_id: env::var("POISE_USER_ID").ok(),
                analytics_endpoint: env::var("POISE_ANALYTICS_URL").ok(),
                analytics_api_key: env::var("POISE_ANALYTICS_KEY").ok(),
            },
        )
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if the database url is blank or the settings are
    /// invalid.
    pub fn from_values(
        db_url: Option<String>,
        settings: AppSettingsDraft,
    ) -> Result<Self, ConfigError> {
        let db_url = match db_url {
            Some(raw) if raw.trim().is_empty() => return Err(ConfigError::InvalidDbUrl(raw)),
            Some(raw) => raw.trim().to_string(),
            None => DEFAULT_DB_URL.to_string(),
        };
        Ok(Self {
            db_url,
            settings: settings.validate()?,
        })
    }

    /// The configured user, or the anonymous user when none is set.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.settings
            .user_id()
            .cloned()
            .unwrap_or_else(UserId::anonymous)
    }
}
