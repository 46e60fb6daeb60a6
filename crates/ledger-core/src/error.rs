use num_bigint::BigUint;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Malformed block or transaction shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("{field} is not a 64-char lowercase hex digest: {value:?}")]
    BadDigest { field: &'static str, value: String },
    #[error("block {index} must carry a previous hash")]
    MissingPreviousHash { index: u64 },
    #[error("genesis-height block must not carry a previous hash")]
    UnexpectedPreviousHash,
    #[error("signature is not hex encoded")]
    BadSignatureEncoding,
    #[error("invalid address {0:?}")]
    BadAddress(String),
    #[error("output amounts must be positive")]
    ZeroAmount,
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("transaction has no outputs")]
    NoOutputs,
    #[error("amounts overflow u64")]
    AmountOverflow,
}

/// Index, linkage, hash, timestamp or work mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("expected block index {expected}, got {found}")]
    BadIndex { expected: u64, found: u64 },
    #[error("previous hash does not match the newest block")]
    PreviousHashMismatch,
    #[error("declared hash {declared} does not match recomputed {computed}")]
    HashMismatch { declared: String, computed: String },
    #[error("hash does not have {difficulty} leading zero bits")]
    InsufficientProofOfWork { difficulty: u32 },
    #[error("timestamp {timestamp} outside the tolerated window")]
    TimestampOutOfRange { timestamp: u64 },
    #[error("chain does not start with the genesis block")]
    GenesisMismatch,
    #[error("chain is empty")]
    EmptyChain,
    #[error("candidate work {candidate} does not exceed current work {current}")]
    InsufficientChainWork { candidate: BigUint, current: BigUint },
}

/// Double spends, bad signatures, value not conserved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("input {tx_out_id}:{tx_out_index} is not unspent")]
    MissingOutput { tx_out_id: String, tx_out_index: u64 },
    #[error("output {tx_out_id}:{tx_out_index} is spent twice")]
    DoubleSpend { tx_out_id: String, tx_out_index: u64 },
    #[error("signature does not verify for input {input}")]
    BadSignature { input: usize },
    #[error("inputs total {inputs} but outputs total {outputs}")]
    AmountMismatch { inputs: u64, outputs: u64 },
    #[error("transaction id {declared} does not match contents")]
    IdMismatch { declared: String },
    #[error("invalid coinbase: {0}")]
    BadCoinbase(&'static str),
    #[error("transaction {tx_id} would recreate existing outputs")]
    DuplicateOutputs { tx_id: String },
    #[error("transaction {0} is already in the mempool")]
    AlreadyPooled(String),
}

/// Wallet could not build what the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("invalid recipient {0:?}")]
    InvalidRecipient(String),
    #[error("amount must be positive")]
    InvalidAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("secret key is not valid hex")]
    BadHex,
    #[error("invalid secp256k1 key: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Key(#[from] KeyError),
}

impl Error {
    /// Stable reason code for callers that translate rejections.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Structural(_) => "structural",
            Error::Consensus(_) => "consensus",
            Error::Ledger(_) => "ledger",
            Error::Resource(_) => "resource",
            Error::Key(_) => "key",
        }
    }

    /// True when a freshly mined block lost a race against another head.
    pub fn is_stale_head(&self) -> bool {
        matches!(
            self,
            Error::Consensus(ConsensusError::BadIndex { .. })
                | Error::Consensus(ConsensusError::PreviousHashMismatch)
        )
    }
}
