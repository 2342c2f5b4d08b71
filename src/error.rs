// Error taxonomy shared by the codec and the verification driver.
// Every failure crosses module boundaries as a kind tag, never as a panic.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The block grid cannot hold one full codeword.
    #[error("image too small: need {needed} bits, have {available}")]
    ImageTooSmall { needed: usize, available: usize },

    /// Input bytes did not decode as a raster image.
    #[error("unsupported image: {0}")]
    UnsupportedImage(#[from] image::ImageError),

    /// Byte errors in the recovered codeword exceed the parity budget.
    #[error("error correction failed: codeword is uncorrectable")]
    EccUncorrectable,

    /// A codec parameter is outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The block decomposition produced non-finite values everywhere.
    #[error("numeric failure in block decomposition")]
    NumericFailure,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of an external registry backend. Lookups are the only remote
/// calls in the pipeline; the batch driver downgrades these to an
/// "unverified" verdict and moves on to the next image.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry transport failed: {0}")]
    Transport(String),

    #[error("registry returned malformed data: {0}")]
    Malformed(String),
}
