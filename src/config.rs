use secrecy::SecretString;

/// Main configuration for a subtrack deployment
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub push: PushConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Web-push delivery configuration.
///
/// The VAPID key pair signs outgoing push messages; the cron secret guards the
/// notification dispatch endpoint. Secrets are held as [`SecretString`] so they
/// never appear in debug output.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// VAPID public key (base64url, unpadded).
    pub vapid_public_key: Option<String>,
    /// VAPID private key (base64url, unpadded).
    pub vapid_private_key: Option<SecretString>,
    /// Contact subject claim attached to VAPID signatures.
    pub vapid_subject: String,
    /// Bearer token expected by the dispatch trigger endpoint.
    pub cron_secret: Option<SecretString>,
    /// Push message time-to-live in seconds.
    pub ttl_seconds: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_subject: default_vapid_subject(),
            cron_secret: None,
            ttl_seconds: default_push_ttl(),
        }
    }
}

impl PushConfig {
    /// Whether both halves of the VAPID key pair are configured.
    #[must_use]
    pub fn signing_configured(&self) -> bool {
        self.vapid_public_key.is_some() && self.vapid_private_key.is_some()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_vapid_subject() -> String {
    "mailto:no-reply@example.com".to_string()
}

fn default_push_ttl() -> u32 {
    60 * 60 * 24
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Load settings from the process environment.
    ///
    /// Recognized variables: `SUBTRACK_LOG_LEVEL`, `SUBTRACK_LOG_JSON`,
    /// `VAPID_PUBLIC_KEY`, `VAPID_PRIVATE_KEY`, `VAPID_SUBJECT`,
    /// `PUSH_CRON_SECRET`. Empty values are treated as unset.
    pub fn from_env(mut self) -> Self {
        if let Some(level) = non_empty_env("SUBTRACK_LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = non_empty_env("SUBTRACK_LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(key) = non_empty_env("VAPID_PUBLIC_KEY") {
            self.config.push.vapid_public_key = Some(key);
        }
        if let Some(key) = non_empty_env("VAPID_PRIVATE_KEY") {
            self.config.push.vapid_private_key = Some(SecretString::new(key));
        }
        if let Some(subject) = non_empty_env("VAPID_SUBJECT") {
            self.config.push.vapid_subject = subject;
        }
        if let Some(secret) = non_empty_env("PUSH_CRON_SECRET") {
            self.config.push.cron_secret = Some(SecretString::new(secret));
        }
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_vapid_keys(
        mut self,
        public_key: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        self.config.push.vapid_public_key = Some(public_key.into());
        self.config.push.vapid_private_key = Some(SecretString::new(private_key.into()));
        self
    }

    pub fn with_vapid_subject(mut self, subject: impl Into<String>) -> Self {
        self.config.push.vapid_subject = subject.into();
        self
    }

    pub fn with_cron_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.push.cron_secret = Some(SecretString::new(secret.into()));
        self
    }

    pub fn with_push_ttl(mut self, seconds: u32) -> Self {
        self.config.push.ttl_seconds = seconds;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(!config.push.signing_configured());
        assert!(config.push.cron_secret.is_none());
        assert_eq!(config.push.ttl_seconds, 86400);
        assert_eq!(config.push.vapid_subject, "mailto:no-reply@example.com");
    }

    #[test]
    fn test_builder() {
        let config = ConfigBuilder::new()
            .with_log_level("debug")
            .with_vapid_keys("pub-key", "priv-key")
            .with_vapid_subject("mailto:ops@subtrack.example")
            .with_cron_secret("hunter2")
            .with_push_ttl(600)
            .build();

        assert_eq!(config.logging.level, "debug");
        assert!(config.push.signing_configured());
        assert_eq!(
            config.push.cron_secret.unwrap().expose_secret(),
            "hunter2"
        );
        assert_eq!(config.push.ttl_seconds, 600);
        assert_eq!(config.push.vapid_subject, "mailto:ops@subtrack.example");
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let config = ConfigBuilder::new()
            .with_vapid_keys("pub-key", "priv-key")
            .with_cron_secret("hunter2")
            .build();

        let debug = format!("{:?}", config.push);
        assert!(!debug.contains("priv-key"));
        assert!(!debug.contains("hunter2"));
    }
}
