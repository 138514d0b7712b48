use crate::*;
use std::path::PathBuf;
use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("zkballot: io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("zkballot: corrupt key material: {0}")]
    CorruptState(String),

    #[error("zkballot: crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("zkballot: ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("zkballot: proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("zkballot: validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("zkballot: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// RSA key handling and vote encryption errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to generate RSA keypair: {0}")]
    KeyGeneration(rsa::Error),

    #[error("failed to parse RSA key: {0}")]
    KeyParse(String),

    #[error("failed to encode RSA key: {0}")]
    KeyEncode(String),

    #[error("plaintext of {len} bytes does not fit a {max} byte PKCS#1 v1.5 block")]
    PlaintextTooLarge { len: usize, max: usize },

    #[error("RSA encryption failed: {0}")]
    Encryption(rsa::Error),

    #[error("RSA decryption failed: {0}")]
    Decryption(rsa::Error),

    #[error("decrypted vote is malformed")]
    MalformedPlaintext,
}

/// Ledger gateway errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to spawn ledger proxy: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("deploying {contract} contract failed: {reason}")]
    Deploy {
        contract: ContractType,
        reason: String,
    },

    #[error("call to {function} failed: {reason}")]
    Call {
        function: &'static str,
        reason: String,
    },

    #[error("vote for ballot {ballot_number} rejected: {reason}")]
    VoteRejected { ballot_number: u16, reason: String },

    #[error("unexpected output from {function}")]
    UnexpectedOutput { function: &'static str },

    #[error("malformed ledger response: {0}")]
    Response(String),

    #[error("poll {0} not found")]
    PollNotFound(String),
}

/// Proof toolchain errors
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("failed to spawn proof toolchain: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("setup in {} failed: {reason}", .directory.display())]
    Setup { directory: PathBuf, reason: String },

    #[error("proving ballot {ballot_number} failed: {reason}")]
    Prove { ballot_number: u16, reason: String },
}

/// Caller-supplied values out of domain
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("at least one answer is required")]
    NoAnswers,

    #[error("answer {0} is empty")]
    EmptyAnswer(usize),

    #[error("answer {0} contains the separator '|'")]
    SeparatorInAnswer(usize),

    #[error("answer {0:?} is not valid hex")]
    InvalidAnswerHex(String),

    #[error("ballot number {0} is outside [1, {}]", BALLOT_SECRET_MAX)]
    BallotNumberOutOfRange(u64),

    #[error("at least one voter is required")]
    NoVoters,

    #[error("{0} voters exceeds the limit of {}", MAX_VOTERS)]
    TooManyVoters(usize),

    #[error("ending {0} is not in the future")]
    EndingInPast(chrono::DateTime<chrono::Utc>),

    #[error("{0} is not a ballot public key")]
    InvalidBallotPublicKey(u64),

    #[error("ballot public key {0} is registered twice")]
    DuplicateVoter(u64),
}
