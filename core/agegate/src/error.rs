use thiserror::Error;

/// Client-input fault raised while turning encoded bytes into a raster.
///
/// Always the caller's problem, never the model's. Transports should map it to
/// a request-validation failure rather than a [`crate::Decision`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,

    #[error("image payload too large: {0}")]
    TooLarge(String),

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("invalid image data: {0}")]
    Malformed(String),

    #[error("image dimensions are zero")]
    ZeroDimensions,
}

/// Fault inside face location or age estimation.
///
/// Never reaches the caller: the arbiter converts it into a forced decision.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    #[error("face crop is empty after clamping to the image")]
    EmptyCrop,

    #[error("inference backend failed: {0}")]
    Backend(String),

    #[error("unexpected model output: {0}")]
    InvalidOutput(String),
}

/// Failure to initialize a detection or estimation backend.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load model {path}: {message}")]
    Backend { path: String, message: String },
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid band table: {0}")]
    InvalidBandTable(String),

    #[error("{name} must be between 0.0 and 1.0, got {value}")]
    InvalidThreshold { name: &'static str, value: f32 },

    #[error("invalid setting {name}: {message}")]
    InvalidSetting { name: &'static str, message: String },
}

/// Failure while constructing an [`crate::AgeGate`] from configuration.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Model(#[from] ModelLoadError),
}
