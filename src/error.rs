use thiserror::Error;

#[derive(Error, Debug)]
pub enum BtLearnError {
    #[error("Invalid genotype: {0}")]
    InvalidGenotype(String),

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, BtLearnError>;
