/// Error types for transaction construction, digest computation and signing.
///
/// Every variant is deterministic: retrying with the same input reproduces
/// the same error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bytes or hex that do not form a valid transaction (or a stated count
    /// that does not match what could be consumed).
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// A private or public key that cannot be used for the requested template.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The Taproot digest needs one prevout entry per transaction input.
    #[error("prevout set has {provided} entries but the transaction has {expected} inputs")]
    IncompletePrevOutSet { expected: usize, provided: usize },

    /// Sighash flag outside {ALL, NONE, SINGLE} x {ANYONECANPAY}, or DEFAULT
    /// used with an ECDSA algorithm.
    #[error("unsupported sighash type 0x{0:02x}")]
    UnsupportedSighashType(u32),

    /// Signing failed on invalid key material.
    #[error("signing error: {0}")]
    SigningError(String),

    #[error("input index {index} out of range (tx has {inputs} inputs)")]
    InputOutOfRange { index: usize, inputs: usize },

    /// Taproot SIGHASH_SINGLE needs an output with the same index as the input.
    #[error("SIGHASH_SINGLE for input {index} has no matching output ({outputs} outputs)")]
    SighashSingleWithoutOutput { index: usize, outputs: usize },

    /// Failure while producing the signature for one input, with enough
    /// context to tell which digest algorithm was in play.
    #[error("input {index} ({algorithm}): {source}")]
    InputSigning {
        index: usize,
        algorithm: crate::sighash::SighashAlgorithm,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::MalformedData(format!("invalid hex: {}", e))
    }
}

/// Errors from the network submission client.
///
/// Transport failures and 5xx responses are retried by the client; a
/// `Rejected` response carries the node's verification message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx, non-5xx status.
    #[error("transaction rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Errors loading the demo configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}
