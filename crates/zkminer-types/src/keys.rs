use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ADDRESS_LENGTH: usize = 20;
pub const SIGNATURE_LENGTH: usize = 64;

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(s.trim_start_matches("0x"))?;
    if bytes.len() != N {
        return Err(TypesError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed::<32>(s).map(Self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// 20-byte account identifier derived from a miner's public key.
/// Serialized as a `0x`-prefixed hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LENGTH]);

impl TryFrom<String> for Address {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self> {
        Self::from_hex(&s)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

impl Address {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ADDRESS_LENGTH {
            return Err(TypesError::InvalidLength {
                expected: ADDRESS_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub const fn zero() -> Self {
        Self([0u8; ADDRESS_LENGTH])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed::<ADDRESS_LENGTH>(s).map(Self)
    }

    /// Short form used in log fields.
    pub fn short(&self) -> String {
        format!("0x{}", &self.to_hex()[..8])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex::decode(s)?))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the bytes have the fixed signature width.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == SIGNATURE_LENGTH
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() < 4 {
            write!(f, "Signature(empty)")
        } else {
            write!(f, "Signature({}...)", &self.to_hex()[..8])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key() {
        let bytes = [1u8; 32];
        let pk = PublicKey::from_bytes(bytes);
        assert_eq!(pk.as_bytes(), &bytes);

        let pk2 = PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, pk2);
    }

    #[test]
    fn test_address_hex_accepts_prefix() {
        let addr = Address::from_bytes([0xab; ADDRESS_LENGTH]);
        let shown = addr.to_string();
        assert!(shown.starts_with("0x"));
        assert_eq!(Address::from_hex(&shown).unwrap(), addr);
        assert_eq!(addr.short(), "0xabababab");
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        let err = Address::from_slice(&[1u8; 32]).unwrap_err();
        assert_eq!(
            err,
            TypesError::InvalidLength {
                expected: ADDRESS_LENGTH,
                actual: 32
            }
        );
        assert!(Address::zero().is_zero());
    }

    #[test]
    fn test_address_serde_as_hex() {
        let addr = Address::from_bytes([0x11; ADDRESS_LENGTH]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "11".repeat(ADDRESS_LENGTH)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<Address>("\"0x1234\"").is_err());
    }

    #[test]
    fn test_signature() {
        let sig = Signature::new(vec![7u8; SIGNATURE_LENGTH]);
        assert!(!sig.is_empty());
        assert!(sig.is_well_formed());

        let empty = Signature::empty();
        assert!(empty.is_empty());
        assert!(!empty.is_well_formed());
        assert_eq!(format!("{:?}", empty), "Signature(empty)");
    }
}
