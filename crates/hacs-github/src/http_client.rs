use std::time::Duration;

use ureq::Agent;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    /// A `hacs/<version>` user agent and no timeout.
    fn default() -> Self {
        Self {
            user_agent: Some(concat!("hacs/", env!("CARGO_PKG_VERSION")).into()),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds an HTTP `Agent` from this config.
    ///
    /// Non-2xx responses are returned as regular responses so callers can inspect rate limit
    /// headers before deciding on an error.
    pub fn build(&self) -> Agent {
        let mut config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(self.timeout);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        config.build().into()
    }
}
