use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tile_abr::{AbrAlgorithm, AbrConfig, BitrateLadder};

use crate::error::ConfigError;

/// Get XDG config directory for tile-stream
/// Returns ~/.config/tile-stream or $XDG_CONFIG_HOME/tile-stream
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|p| p.join("tile-stream"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Returns ~/.config/tile-stream/client.toml
pub fn client_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("client.toml"))
}

/// Returns ~/.config/tile-stream/server.toml
pub fn server_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("server.toml"))
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

fn save_toml<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Explicit path must exist; otherwise fall back to the default location,
/// then to built-in defaults.
fn load_or_default<T>(explicit: Option<&Path>, default_path: Result<PathBuf, ConfigError>) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if let Some(path) = explicit {
        return load_toml(path);
    }
    match default_path {
        Ok(path) if path.exists() => load_toml(&path),
        _ => Ok(T::default()),
    }
}

/// Client session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address as host:port
    pub server_address: String,
    /// TLS server name
    pub server_name: String,
    /// CA certificate (PEM); the server certificate is not verified when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
    pub bitrates: Vec<u32>,
    pub algorithm: AbrAlgorithm,
    /// Number of segments to request
    pub segments: u32,
    pub segment_duration_secs: f64,
    /// Segments kept in the reassembly buffer
    pub window_limit: usize,
    /// How long to wait for one segment's tiles before moving on
    pub segment_timeout_secs: f64,
    /// Pause after the last segment before ending the streams
    pub linger_secs: f64,
    /// Random hex id when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Link capacity in megabits per second, for the channel usage report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_mbps: Option<f64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:4433".to_string(),
            server_name: "localhost".to_string(),
            ca_cert: None,
            bitrates: vec![400, 800, 1600],
            algorithm: AbrAlgorithm::Basic,
            segments: 10,
            segment_duration_secs: 1.0,
            window_limit: 10,
            segment_timeout_secs: 5.0,
            linger_secs: 0.0,
            client_id: None,
            link_mbps: None,
        }
    }
}

impl ClientConfig {
    /// Load config from specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }

    /// Load from `path`, or the default location, or built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        load_or_default(path, client_config_path())
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        save_toml(self, path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        BitrateLadder::new(self.bitrates.clone())
            .map_err(|e| ConfigError::Invalid(format!("bitrates: {e}")))?;
        if self.segments == 0 {
            return Err(ConfigError::Invalid("segments must be at least 1".into()));
        }
        if self.window_limit == 0 {
            return Err(ConfigError::Invalid("window_limit must be at least 1".into()));
        }
        if !(self.segment_duration_secs > 0.0) {
            return Err(ConfigError::Invalid("segment_duration_secs must be positive".into()));
        }
        if !(self.segment_timeout_secs > 0.0) {
            return Err(ConfigError::Invalid("segment_timeout_secs must be positive".into()));
        }
        if !(self.linger_secs >= 0.0) {
            return Err(ConfigError::Invalid("linger_secs must not be negative".into()));
        }
        if self.link_mbps.is_some_and(|link| !(link > 0.0)) {
            return Err(ConfigError::Invalid("link_mbps must be positive".into()));
        }
        Ok(())
    }

    pub fn abr_config(&self) -> AbrConfig {
        AbrConfig {
            bitrates: self.bitrates.clone(),
            algorithm: self.algorithm.clone(),
            segment_duration_secs: self.segment_duration_secs,
        }
    }

    /// Configured client id, or a fresh random one
    pub fn resolved_client_id(&self) -> String {
        match &self.client_id {
            Some(id) => id.clone(),
            None => hex::encode(rand::random::<[u8; 4]>()),
        }
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.segment_timeout_secs)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_secs_f64(self.linger_secs)
    }

    /// Share of the configured link used by `throughput_bps`
    pub fn channel_usage(&self, throughput_bps: f64) -> Option<f64> {
        self.link_mbps
            .map(|link| tile_metrics::channel_usage(throughput_bps, link))
    }
}

/// Reference tile server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address as ip:port
    pub listen: String,
    /// Value of the push acknowledgement on every response
    pub push: bool,
    /// Payload bytes per bitrate unit per second of video, across all tiles
    pub tile_scale: f64,
    pub segment_duration_secs: f64,
    /// Certificate chain (PEM); a self-signed certificate is generated when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
    /// Where to write the generated self-signed certificate for clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_out: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:4433".to_string(),
            push: false,
            tile_scale: 125.0,
            segment_duration_secs: 1.0,
            cert: None,
            key: None,
            cert_out: None,
        }
    }
}

impl ServerConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        load_or_default(path, server_config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        save_toml(self, path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cert.is_some() != self.key.is_some() {
            return Err(ConfigError::Invalid("cert and key must be set together".into()));
        }
        if !(self.tile_scale >= 0.0) {
            return Err(ConfigError::Invalid("tile_scale must not be negative".into()));
        }
        if !(self.segment_duration_secs > 0.0) {
            return Err(ConfigError::Invalid("segment_duration_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("tile-session-{}-{}", std::process::id(), name))
            .join("config.toml")
    }

    #[test]
    fn test_defaults_are_valid() {
        ClientConfig::default().validate().unwrap();
        ServerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            server_address = "10.0.0.2:4433"
            algorithm = "channel_flow_rate"
            "#,
        )
        .unwrap();
        assert_eq!(config.server_address, "10.0.0.2:4433");
        assert_eq!(config.algorithm, AbrAlgorithm::ChannelFlowRate);
        assert_eq!(config.bitrates, vec![400, 800, 1600]);
        assert_eq!(config.segments, 10);
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let config = ClientConfig {
            ca_cert: Some(PathBuf::from("/etc/tile/ca.pem")),
            client_id: Some("abcd".into()),
            algorithm: AbrAlgorithm::Unknown("bba".into()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        let loaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_explicit_path() {
        let err = ClientConfig::load_or_default(Some(Path::new("/nonexistent/client.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_ladder = ClientConfig {
            bitrates: vec![800, 400],
            ..Default::default()
        };
        assert!(matches!(bad_ladder.validate(), Err(ConfigError::Invalid(_))));

        let no_segments = ClientConfig {
            segments: 0,
            ..Default::default()
        };
        assert!(no_segments.validate().is_err());

        let no_window = ClientConfig {
            window_limit: 0,
            ..Default::default()
        };
        assert!(no_window.validate().is_err());

        let half_tls = ServerConfig {
            cert: Some(PathBuf::from("cert.pem")),
            ..Default::default()
        };
        assert!(half_tls.validate().is_err());
    }

    #[test]
    fn test_channel_usage_needs_link_capacity() {
        assert_eq!(ClientConfig::default().channel_usage(1_048_576.0), None);

        let config: ClientConfig = toml::from_str("link_mbps = 4.0").unwrap();
        config.validate().unwrap();
        assert_eq!(config.channel_usage(1_048_576.0), Some(0.25));

        let zero = ClientConfig {
            link_mbps: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_client_id() {
        let config = ClientConfig::default();
        let id = config.resolved_client_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let fixed = ClientConfig {
            client_id: Some("viewer-1".into()),
            ..Default::default()
        };
        assert_eq!(fixed.resolved_client_id(), "viewer-1");
    }
}
