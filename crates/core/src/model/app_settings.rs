use thiserror::Error;
use url::Url;

use crate::model::UserId;

/// Deployment-level settings: who is signed in and where analytics go.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AppSettings {
    user_id: Option<UserId>,
    analytics_endpoint: Option<Url>,
    analytics_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct AppSettingsDraft {
    pub user_id: Option<String>,
    pub analytics_endpoint: Option<String>,
    pub analytics_api_key: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AppSettingsError {
    #[error("invalid analytics endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("invalid user id")]
    InvalidUserId,
}

impl AppSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalize the draft.
    ///
    /// # Errors
    ///
    /// Returns `AppSettingsError::InvalidEndpoint` if the endpoint is present but
    /// is not an http(s) URL.
    pub fn validate(self) -> Result<AppSettings, AppSettingsError> {
        let user_id = normalize_optional(self.user_id)
            .map(UserId::new)
            .transpose()
            .map_err(|_| AppSettingsError::InvalidUserId)?;

        let analytics_endpoint = match normalize_optional(self.analytics_endpoint) {
            Some(raw) => {
                let url =
                    Url::parse(&raw).map_err(|_| AppSettingsError::InvalidEndpoint(raw.clone()))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(AppSettingsError::InvalidEndpoint(raw));
                }
                Some(url)
            }
            None => None,
        };

        Ok(AppSettings {
            user_id,
            analytics_endpoint,
            analytics_api_key: normalize_optional(self.analytics_api_key),
        })
    }
}

impl AppSettings {
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    #[must_use]
    pub fn analytics_endpoint(&self) -> Option<&Url> {
        self.analytics_endpoint.as_ref()
    }

    #[must_use]
    pub fn analytics_api_key(&self) -> Option<&str> {
        self.analytics_api_key.as_deref()
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_normalize_to_none() {
        let settings = AppSettingsDraft {
            user_id: Some("  ".into()),
            analytics_endpoint: Some(String::new()),
            analytics_api_key: Some(" key ".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(settings.user_id(), None);
        assert_eq!(settings.analytics_endpoint(), None);
        assert_eq!(settings.analytics_api_key(), Some("key"));
    }

    #[test]
    fn endpoint_must_be_http() {
        let err = AppSettingsDraft {
            analytics_endpoint: Some("ftp://example.com/events".into()),
            ..AppSettingsDraft::new()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, AppSettingsError::InvalidEndpoint(_)));

        let ok = AppSettingsDraft {
            analytics_endpoint: Some("https://hooks.example.com/track".into()),
            user_id: Some("user-42".into()),
            ..AppSettingsDraft::new()
        }
        .validate()
        .unwrap();
        assert_eq!(ok.user_id().map(UserId::as_str), Some("user-42"));
        assert_eq!(
            ok.analytics_endpoint().map(Url::as_str),
            Some("https://hooks.example.com/track")
        );
    }
}
