use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("State error: {message}")]
    State { message: String },

    #[error("Integrity violation in {stage}: {details}")]
    Integrity { stage: String, details: String },

    #[error("Solver error in {operation}: {details}")]
    Solver { operation: String, details: String },

    #[error("Settings error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[cfg(feature = "files")]
    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported camera file format: {extension}")]
    UnsupportedFormat { extension: String },
}

impl CalibrationError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn state<S: Into<String>>(message: S) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    pub fn integrity<S: Into<String>, D: Into<String>>(stage: S, details: D) -> Self {
        Self::Integrity {
            stage: stage.into(),
            details: details.into(),
        }
    }

    pub fn solver<S: Into<String>, D: Into<String>>(operation: S, details: D) -> Self {
        Self::Solver {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// True for programming-contract breaches that callers must not retry
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}

pub type Result<T> = std::result::Result<T, CalibrationError>;
