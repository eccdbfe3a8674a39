// Error taxonomy for the verification core.
// One enum per concern, covering its distinct failure outcomes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of buffer: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("varint exceeds 2-byte encoding")]
    VarintOverflow,

    #[error("frame length {0} exceeds maximum {1}")]
    FrameTooLarge(u32, u32),
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("header buffer is {0} bytes, expected {1}")]
    WrongSize(usize, usize),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("header does not extend the current tip")]
    NotTipSuccessor,

    #[error("duplicate header")]
    Duplicate,

    #[error("header is ahead of the known network tip")]
    AheadOfNetwork,

    #[error("chain is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("truncated or malformed store file")]
    Malformed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Encode(#[from] bincode::Error),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProofError {
    #[error("bad arguments")]
    BadArgs,

    #[error("malformed proof encoding")]
    Encoding,

    #[error("collision leaf key equals the query key")]
    SameKey,

    #[error("short leaf prefix equals the query key's path")]
    SamePath,

    #[error("depth underflow while walking ancestors")]
    NegativeDepth,

    #[error("node prefix does not match the query key's path")]
    PathMismatch,

    #[error("proof depth exceeds 256")]
    TooDeep,

    #[error("reconstructed root does not match the expected name root")]
    HashMismatch,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    #[error("unsupported resource payload version {0}")]
    UnsupportedVersion(u8),

    #[error("dns name exceeds 255 bytes")]
    NameTooLong,

    #[error("dns label exceeds 63 bytes")]
    LabelTooLong,

    #[error("compression pointer cycle or depth exceeded")]
    PointerLoop,

    #[error("truncated resource payload")]
    Truncated,
}
