use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Image loading error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata extraction error: {0}")]
    MetadataError(String),

    #[error("Model weights error: {0}")]
    InvalidWeights(String),

    #[error("Weights deserialization error: {0}")]
    WeightsFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForensicsError>;
