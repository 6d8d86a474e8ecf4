use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unrecognized image format")]
    UnsupportedFormat,

    #[error("could not decode image: {0}")]
    Decode(String),

    #[error("could not encode image: {0}")]
    Encode(String),
}
