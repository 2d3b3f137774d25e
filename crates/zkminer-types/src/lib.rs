//! Value types shared across the zkminer workspace: chain heights, header
//! hashes, account addresses, public keys and signatures.

pub mod error;
pub mod header;
pub mod keys;

pub use error::{Result, TypesError};
pub use header::Header;
pub use keys::{Address, PublicKey, Signature, ADDRESS_LENGTH, SIGNATURE_LENGTH};

/// Block height on the watched chain.
pub type Height = u64;

/// 32-byte digest identifying a block header.
pub type Hash = [u8; 32];

/// All-zero hash used for the genesis parent.
pub const ZERO_HASH: Hash = [0u8; 32];
