//! Chat-completion client configuration.

use std::time::Duration;

/// Configuration for [`crate::ChatClient`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// API key; `None` makes every call fail with `ServiceUnavailable`
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Target model identifier
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Sent as `HTTP-Referer`
    pub app_url: String,
    /// Sent as `X-Title`
    pub app_title: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-3.5-turbo".to_string(),
            timeout: Duration::from_secs(120),
            app_url: "http://localhost:3000".to_string(),
            app_title: "VidNotes".to_string(),
        }
    }
}

impl ChatConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |key: &str, default: String| -> String {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        Self {
            api_key: std::env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            base_url: var("OPENROUTER_BASE_URL", defaults.base_url),
            model: var("OPENROUTER_MODEL", defaults.model),
            timeout: std::env::var("OPENROUTER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            app_url: var("APP_URL", defaults.app_url),
            app_title: var("APP_TITLE", defaults.app_title),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 4] = [
        "OPENROUTER_API_KEY",
        "OPENROUTER_MODEL",
        "OPENROUTER_TIMEOUT_SECS",
        "OPENROUTER_BASE_URL",
    ];

    fn clear() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear();
        let config = ChatConfig::from_env();
        assert!(!config.is_configured());
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.model, "openai/gpt-3.5-turbo");
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear();
        std::env::set_var("OPENROUTER_API_KEY", "sk-test");
        std::env::set_var("OPENROUTER_MODEL", "anthropic/claude-3-haiku");
        std::env::set_var("OPENROUTER_TIMEOUT_SECS", "30");

        let config = ChatConfig::from_env();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "anthropic/claude-3-haiku");
        assert_eq!(config.timeout, Duration::from_secs(30));
        clear();
    }

    #[test]
    #[serial]
    fn test_blank_key_is_unconfigured() {
        clear();
        std::env::set_var("OPENROUTER_API_KEY", "  ");
        assert!(!ChatConfig::from_env().is_configured());
        clear();
    }
}
