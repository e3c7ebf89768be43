use std::time::Duration;

// defaults for the inference API
pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Settings for [`crate::AnthropicClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Full URL of the Messages endpoint.
    pub endpoint: String,
    /// Model identifier sent in every request.
    pub model: String,
    /// Token budget for the reply.
    pub max_tokens: u32,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    /// Overall request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Same defaults, pointed at another endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}
