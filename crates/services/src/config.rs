use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ApiError;

/// Default cadence of the typewriter reveal, one token per tick.
pub const DEFAULT_TYPE_SPEED: Duration = Duration::from_millis(20);

/// Where the tutoring backend lives.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    base_url: String,
}

impl BackendConfig {
    /// Validate and store a backend base URL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the value does not parse as an
    /// absolute URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let base_url = base_url.into();
        Url::parse(&base_url).map_err(|_| ApiError::InvalidUrl(base_url.clone()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Read the backend URL from `MENTOR_BACKEND_URL`.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let raw = env::var("MENTOR_BACKEND_URL").ok()?;
        if raw.trim().is_empty() {
            return None;
        }
        Self::new(raw).ok()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an endpoint path.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
