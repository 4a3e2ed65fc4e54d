use std::time::Duration;

/// Default API root, matching a local development backend.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default ceiling on pages fetched in one collection walk.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. Unparsable
/// values fall back to the default rather than failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root without trailing slash, e.g. `http://host:8000/api`.
    pub base_url: String,
    pub request_timeout: Duration,
    /// A walk that would fetch more pages than this fails.
    pub max_pages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                       | Default                       |
    /// |-------------------------------|-------------------------------|
    /// | `BANSOS_API_BASE_URL`         | `http://127.0.0.1:8000/api`   |
    /// | `BANSOS_REQUEST_TIMEOUT_SECS` | `30`                          |
    /// | `BANSOS_MAX_PAGES`            | `1000`                        |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("BANSOS_API_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = lookup("BANSOS_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let max_pages = lookup("BANSOS_MAX_PAGES")
            .and_then(|v| v.trim().parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_MAX_PAGES);

        Self {
            base_url,
            request_timeout: Duration::from_secs(timeout_secs),
            max_pages,
        }
    }

    /// Absolute URL for an API path such as `"kecamatan/"`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
