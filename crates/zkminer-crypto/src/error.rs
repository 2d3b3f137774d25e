use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("Invalid digest size: expected 32 bytes, got {0}")]
    InvalidDigestSize(usize),

    #[error("Invalid key encoding: {0}")]
    InvalidEncoding(String),

    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("Key file error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
