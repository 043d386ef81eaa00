use serde::Deserialize;

/// Environment variable overriding the segmentation service base URL.
pub const SERVICE_URL_ENV: &str = "BRATS_SERVICE_URL";

/// Base URL used when no override is configured.
pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8000";

/// Connection settings for the remote segmentation service.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Base URL of the inference service, without a trailing path.
    pub service_url: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
        }
    }
}

impl ViewerConfig {
    /// Resolve the configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        match std::env::var(SERVICE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self { service_url: url },
            _ => Self::default(),
        }
    }
}
