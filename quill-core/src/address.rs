//! Peer addresses: binary form (public key + nospam + checksum) and the
//! canonical upper-case hex codec.

use serde::{Deserialize, Serialize};

/// Long-lived public identity key (32 bytes, X25519).
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Anti-spam routing tag appended to the public key.
pub const NOSPAM_SIZE: usize = 4;
/// Checksum over public key + nospam.
pub const CHECKSUM_SIZE: usize = 2;
/// Full binary address: public key, nospam, checksum.
pub const ADDRESS_SIZE: usize = PUBLIC_KEY_SIZE + NOSPAM_SIZE + CHECKSUM_SIZE;
/// Length of the canonical hex form.
pub const ADDRESS_HEX_LEN: usize = ADDRESS_SIZE * 2;

/// Peer public key. Serializable for transport frames.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "bytes_32")] [u8; PUBLIC_KEY_SIZE]);

mod bytes_32 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    pub fn serialize<S: Serializer>(v: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        v.as_slice().serialize(serializer)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let buf: Vec<u8> = Deserialize::deserialize(d)?;
        buf.try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Parse from the hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        from_hex_exact::<PUBLIC_KEY_SIZE>(s).map(PublicKey)
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&to_hex_upper(&self.0))
    }
}

/// Binary peer address: public key, nospam, checksum. Immutable once built.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Address(#[serde(with = "bytes_38")] [u8; ADDRESS_SIZE]);

mod bytes_38 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    pub fn serialize<S: Serializer>(v: &[u8; 38], serializer: S) -> Result<S::Ok, S::Error> {
        v.as_slice().serialize(serializer)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 38], D::Error> {
        let buf: Vec<u8> = Deserialize::deserialize(d)?;
        buf.try_into()
            .map_err(|_| serde::de::Error::custom("expected 38 bytes"))
    }
}

impl Address {
    /// Build from a key and nospam, computing the checksum.
    pub fn new(public_key: &PublicKey, nospam: [u8; NOSPAM_SIZE]) -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes[..PUBLIC_KEY_SIZE].copy_from_slice(public_key.as_bytes());
        bytes[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + NOSPAM_SIZE].copy_from_slice(&nospam);
        let sum = checksum(&bytes[..PUBLIC_KEY_SIZE + NOSPAM_SIZE]);
        bytes[PUBLIC_KEY_SIZE + NOSPAM_SIZE..].copy_from_slice(&sum);
        Address(bytes)
    }

    /// Wrap raw bytes as-is. The checksum is taken on faith; callers that
    /// accept addresses from outside should check `checksum_valid`.
    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn public_key(&self) -> PublicKey {
        let mut key = [0u8; PUBLIC_KEY_SIZE];
        key.copy_from_slice(&self.0[..PUBLIC_KEY_SIZE]);
        PublicKey(key)
    }

    pub fn nospam(&self) -> [u8; NOSPAM_SIZE] {
        let mut nospam = [0u8; NOSPAM_SIZE];
        nospam.copy_from_slice(&self.0[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + NOSPAM_SIZE]);
        nospam
    }

    pub fn checksum_valid(&self) -> bool {
        checksum(&self.0[..PUBLIC_KEY_SIZE + NOSPAM_SIZE])
            == self.0[PUBLIC_KEY_SIZE + NOSPAM_SIZE..]
    }

    /// Canonical hex form: `2 * ADDRESS_SIZE` upper-case digits, no separators.
    pub fn encode(&self) -> String {
        to_hex_upper(&self.0)
    }

    /// Exact inverse of `encode`. Accepts lower-case digits; the length must
    /// be exactly `2 * ADDRESS_SIZE`.
    pub fn decode(s: &str) -> Result<Self, AddressParseError> {
        from_hex_exact::<ADDRESS_SIZE>(s).map(Address)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::str::FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::decode(s)
    }
}

/// Two-byte XOR fold over the key + nospam portion of an address.
pub fn checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut sum = [0u8; CHECKSUM_SIZE];
    for (i, &b) in data.iter().enumerate() {
        sum[i % CHECKSUM_SIZE] ^= b;
    }
    sum
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum AddressParseError {
    #[error("expected {expected} hex digits, got {len}")]
    InvalidLength { len: usize, expected: usize },
    #[error("invalid hex digit at position {at}")]
    InvalidDigit { at: usize },
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn to_hex_upper(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

fn from_hex_exact<const N: usize>(s: &str) -> Result<[u8; N], AddressParseError> {
    if s.len() != N * 2 {
        return Err(AddressParseError::InvalidLength {
            len: s.len(),
            expected: N * 2,
        });
    }
    let mut out = [0u8; N];
    for (i, c) in s.chars().enumerate() {
        let v = c
            .to_digit(16)
            .ok_or(AddressParseError::InvalidDigit { at: i })? as u8;
        if i % 2 == 0 {
            out[i / 2] = v << 4;
        } else {
            out[i / 2] |= v;
        }
    }
    Ok(out)
}
