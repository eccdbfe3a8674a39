//! Pure verification core for the HNS resolver.
//!
//! Everything in this crate is deterministic and free of I/O: wire codecs,
//! the 236-byte header layout and its composite hash, the bounded header
//! chain and its on-disk store, radix-tree proof verification, and the
//! resource record decoder. Networking, DNS serving, and the CLI live in
//! `hns-resolver`.

pub mod codec;
pub mod header;
pub mod chain;
pub mod checkpoint;
pub mod store;
pub mod proof;
pub mod resource;
pub mod error;

pub use error::{ChainError, CodecError, HeaderError, ProofError, ResourceError, StoreError};
pub use header::{Header, HeaderHash, HEADER_SIZE};
pub use chain::HeaderChain;
pub use proof::{Proof, ProofKind};
pub use resource::NameRecord;
