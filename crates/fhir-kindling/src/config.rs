use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KindlingError, Result};
use crate::query::OutputFormat;
use crate::transport::{Auth, HttpTransport};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "kindling.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KindlingConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// FHIR server connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerSettings {
    /// Base URL of the FHIR API, e.g. `http://localhost:8080/fhir`
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Bearer token; mutually exclusive with username/password
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl KindlingConfig {
    pub fn validate(&self) -> Result<()> {
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(KindlingError::configuration(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }

        let server = &self.server;
        if let Some(api_url) = &server.api_url {
            url::Url::parse(api_url).map_err(|e| {
                KindlingError::configuration(format!("server.api_url is not a valid URL: {e}"))
            })?;
        }
        if server.username.is_some() != server.password.is_some() {
            return Err(KindlingError::configuration(
                "server.username and server.password must be set together",
            ));
        }
        if server.username.is_some() && server.token.is_some() {
            return Err(KindlingError::configuration(
                "set either server.username/password or server.token, not both",
            ));
        }
        if server.timeout_secs == Some(0) {
            return Err(KindlingError::configuration(
                "server.timeout_secs must be > 0",
            ));
        }
        Ok(())
    }
}

impl ServerSettings {
    pub fn require_api_url(&self) -> Result<&str> {
        self.api_url.as_deref().ok_or_else(|| {
            KindlingError::configuration(
                "No FHIR API URL configured. Set server.api_url, KINDLING__SERVER__API_URL or FHIR_API_URL",
            )
        })
    }

    pub fn auth(&self) -> Option<Auth> {
        match (&self.username, &self.password, &self.token) {
            (Some(username), Some(password), _) => Some(Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            (_, _, Some(token)) => Some(Auth::Bearer {
                token: token.clone(),
            }),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn transport(&self) -> Result<HttpTransport> {
        HttpTransport::with_timeout(self.auth(), self.timeout())
    }

    /// Fill unset connection settings from the plain `FHIR_*` variables.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let slots = [
            (&mut self.api_url, "FHIR_API_URL"),
            (&mut self.username, "FHIR_USER"),
            (&mut self.password, "FHIR_PW"),
            (&mut self.token, "FHIR_TOKEN"),
        ];
        for (slot, var) in slots {
            if slot.is_none() {
                *slot = lookup(var).filter(|v| !v.is_empty());
            }
        }
    }
}

pub mod loader {
    use super::*;
    use config::{Config, Environment, File};

    /// Load configuration from a TOML file (if present), `KINDLING__*`
    /// environment overrides and the plain `FHIR_*` variables, in that order
    /// of precedence for the file and overrides; the plain variables only fill
    /// gaps.
    pub fn load_config(path: Option<&Path>) -> Result<KindlingConfig> {
        let mut builder = Config::builder();
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }
        // Environment variable overrides, e.g., KINDLING__SERVER__API_URL=http://...
        builder = builder.add_source(
            Environment::with_prefix("KINDLING")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| KindlingError::configuration(format!("config build error: {e}")))?;
        let mut merged: KindlingConfig = cfg
            .try_deserialize()
            .map_err(|e| KindlingError::configuration(format!("config deserialize error: {e}")))?;
        merged
            .server
            .apply_legacy_env(|key| std::env::var(key).ok());
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings() -> ServerSettings {
        ServerSettings {
            api_url: Some("http://localhost:8080/fhir".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = KindlingConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.server.format, OutputFormat::Json);
        assert!(cfg.server.require_api_url().is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut cfg = KindlingConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());

        let mut cfg = KindlingConfig::default();
        cfg.server.api_url = Some("not a url".into());
        assert!(cfg.validate().is_err());

        let mut cfg = KindlingConfig::default();
        cfg.server.username = Some("alice".into());
        assert!(cfg.validate().is_err());

        cfg.server.password = Some("secret".into());
        assert!(cfg.validate().is_ok());
        cfg.server.token = Some("token".into());
        assert!(cfg.validate().is_err());

        let mut cfg = KindlingConfig::default();
        cfg.server.timeout_secs = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_auth_selection() {
        let mut server = settings();
        assert_eq!(server.auth(), None);

        server.token = Some("abc".into());
        assert_eq!(
            server.auth(),
            Some(Auth::Bearer {
                token: "abc".into()
            })
        );

        server.token = None;
        server.username = Some("alice".into());
        server.password = Some("secret".into());
        assert!(matches!(server.auth(), Some(Auth::Basic { username, .. }) if username == "alice"));
    }

    #[test]
    fn test_legacy_env_only_fills_gaps() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FHIR_API_URL", "http://legacy/fhir"),
            ("FHIR_USER", "bob"),
            ("FHIR_PW", "pw"),
            ("FHIR_TOKEN", ""),
        ]);
        let mut server = settings();
        server.apply_legacy_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(server.api_url.as_deref(), Some("http://localhost:8080/fhir"));
        assert_eq!(server.username.as_deref(), Some("bob"));
        assert_eq!(server.password.as_deref(), Some("pw"));
        assert_eq!(server.token, None);
    }

    #[test]
    fn test_timeout() {
        let mut server = settings();
        assert_eq!(server.timeout(), None);
        server.timeout_secs = Some(30);
        assert_eq!(server.timeout(), Some(Duration::from_secs(30)));
    }
}
