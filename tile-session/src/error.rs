use thiserror::Error;

use tile_abr::LadderError;
use tile_quic::TlsError;
use tile_wire::FrameError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Config file not found at {0}")]
    NotFound(String),

    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid bitrate ladder: {0}")]
    Ladder(#[from] LadderError),

    #[error("Connect error: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("Connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("Stream already closed")]
    StreamClosed(#[from] quinn::ClosedStream),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No address found for {0}")]
    Resolve(String),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
