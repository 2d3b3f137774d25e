//! Key material for lottery miners.
//!
//! A miner is identified by an ed25519 key. Its on-chain [`Address`] is the
//! last 20 bytes of `keccak256(public_key)`. Lottery tickets are signed over
//! a 32-byte keccak digest via [`Keypair::sign_digest`].

pub mod error;

pub use error::{CryptoError, Result};

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::path::Path;
use zkminer_types::{Address, PublicKey, Signature, ADDRESS_LENGTH, SIGNATURE_LENGTH};

pub const SECRET_KEY_LENGTH: usize = 32;
pub const DIGEST_LENGTH: usize = 32;

/// keccak256 over the concatenation of `parts`.
pub fn keccak256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let digest = keccak256(&[public_key.as_bytes()]);
    let mut out = [0u8; ADDRESS_LENGTH];
    out.copy_from_slice(&digest[32 - ADDRESS_LENGTH..]);
    Address::from_bytes(out)
}

/// A keypair for signing and verification
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    public_key: PublicKey,
    address: Address,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create a keypair from the 32-byte secret
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(CryptoError::InvalidKeySize {
                expected: SECRET_KEY_LENGTH,
                actual: bytes.len(),
            });
        }

        let mut key_bytes = [0u8; SECRET_KEY_LENGTH];
        key_bytes.copy_from_slice(bytes);
        Ok(Self::from_signing_key(SigningKey::from_bytes(&key_bytes)))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim().trim_start_matches("0x"))
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey::from_bytes(signing_key.verifying_key().to_bytes());
        let address = address_from_public_key(&public_key);
        Self {
            signing_key,
            public_key,
            address,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign an arbitrary message
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature::new(signature.to_bytes().to_vec())
    }

    /// Sign a precomputed 32-byte digest. Anything else is rejected.
    pub fn sign_digest(&self, digest: &[u8]) -> Result<Signature> {
        if digest.len() != DIGEST_LENGTH {
            return Err(CryptoError::InvalidDigestSize(digest.len()));
        }
        Ok(self.sign(digest))
    }

    /// Export the secret (public part is derived)
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Reads a hex-encoded secret key file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_hex(&contents)
    }

    /// Writes the secret as hex, creating parent directories as needed.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_hex())?;
        Ok(())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

pub fn verify_signature(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key.as_bytes())
        .map_err(|_| CryptoError::SignatureVerificationFailed)?;

    let sig_bytes: [u8; SIGNATURE_LENGTH] = signature
        .as_bytes()
        .try_into()
        .map_err(|_| CryptoError::SignatureVerificationFailed)?;

    verifying_key
        .verify(message, &DalekSignature::from_bytes(&sig_bytes))
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}
