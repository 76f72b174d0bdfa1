use std::time::Duration;

use crate::error::AirError;

/// Environment variable holding the Civitai API token.
pub const TOKEN_ENV: &str = "CIVIT_API";

pub const DEFAULT_USER_AGENT: &str = "civitai-downloader/air-routing";
pub const DEFAULT_PRE_FETCH_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything the HTTP client needs, built once per run.
#[derive(Clone)]
pub struct ClientConfig {
    pub token: String,
    pub user_agent: String,
    pub pre_fetch_delay: Duration,
    /// Total limit for a `HEAD` request.
    pub probe_timeout: Duration,
    /// Limit for connecting, for the response head and for each body read.
    /// A transfer that keeps making progress may take longer.
    pub fetch_timeout: Duration,
}

impl ClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pre_fetch_delay: DEFAULT_PRE_FETCH_DELAY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, AirError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AirError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(TOKEN_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AirError::MissingCredential(TOKEN_ENV.to_string()))?;
        Ok(Self::new(token))
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_pre_fetch_delay(mut self, delay: Duration) -> Self {
        self.pre_fetch_delay = delay;
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("pre_fetch_delay", &self.pre_fetch_delay)
            .field("probe_timeout", &self.probe_timeout)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}
