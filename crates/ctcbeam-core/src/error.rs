use thiserror::Error;

/// All errors produced by ctcbeam-core.
///
/// Everything here is a construction-time problem: once a decoder and a
/// decodable are built, the hot loops assume well-formed inputs and do not
/// return errors.
#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("beam must be positive, got {0}")]
    InvalidBeam(f32),

    #[error("max_active must be greater than 1, got {0}")]
    InvalidMaxActive(usize),

    #[error("min_active ({min_active}) must be less than max_active ({max_active})")]
    InvalidMinActive {
        min_active: usize,
        max_active: usize,
    },

    #[error("hash_ratio must be at least 1.0, got {0}")]
    InvalidHashRatio(f32),

    #[error("log-likelihood matrix length {len} is not a multiple of num_labels ({num_labels})")]
    MalformedLoglikes { len: usize, num_labels: usize },

    #[error("blank label {blank} outside the label range 1..={num_labels}")]
    BlankOutOfRange { blank: u32, num_labels: usize },
}

pub type Result<T> = std::result::Result<T, DecoderError>;
