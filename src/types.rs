use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, fs, path::{Path, PathBuf}, str::FromStr};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::constants::*;
use crate::error::KeyError;
use crate::utils::strip_hex_prefix;

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First four bytes followed by an ellipsis.
    pub fn abridged(&self) -> String {
        format!("{}\u{2026}", hex::encode(&self.0[..4]))
    }

    /// Direct ICAP needs the leading byte to be zero.
    pub fn is_icap_capable(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", self.hex())
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(strip_hex_prefix(s)).map_err(|_| KeyError::InvalidAddress(s.to_string()))?;
        let bytes: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| KeyError::InvalidAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = KeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.hex()
    }
}

/// A raw 32-byte secret key, zeroed on drop.
#[derive(Clone)]
pub struct Secret(Zeroizing<[u8; SECRET_LEN]>);

impl Secret {
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let mut secret = Zeroizing::new([0u8; SECRET_LEN]);
        if bytes.len() != SECRET_LEN {
            return None;
        }
        secret.copy_from_slice(bytes);
        Some(Self(secret))
    }

    /// Parses exactly 64 hex digits, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = Zeroizing::new(hex::decode(strip_hex_prefix(s.trim())).ok()?);
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret: Secret,
    pub address: Address,
}

/// KDF parameters as stored next to a ciphertext.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum KdfParams {
    Scrypt { dklen: usize, n: u32, r: u32, p: u32, salt: String },
    Pbkdf2 { dklen: usize, c: u32, prf: String, salt: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedData {
    pub cipher: String,
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
    pub kdf: String,
    pub kdfparams: KdfParams,
}

/// One key of the secret store, as written to `<uuid>.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyFile {
    pub version: u32,
    pub id: Uuid,
    pub address: Address,
    pub crypto: EncryptedData,
}

/// The wallet file: metadata in the clear, the account registry sealed with the master password.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WalletFile {
    pub version: u32,
    pub created_at: String,
    pub registry: EncryptedData,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Registry {
    pub salt: String,
    pub accounts: Vec<AccountInfo>,
    /// Password hash to hint.
    pub hints: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccountInfo {
    pub uuid: Uuid,
    pub address: Address,
    pub name: String,
    /// Empty when the password protecting the key is not known to the wallet.
    pub password_hash: String,
}

/// An import input, classified once.
#[derive(Debug)]
pub enum KeySource {
    /// The token itself is a hex secret.
    Secret(Secret),
    /// The token names a file holding a hex secret.
    SecretFile(PathBuf, Secret),
    /// Any other existing file; handed to the store's native import.
    KeyFile(PathBuf),
    Unusable,
}

impl KeySource {
    pub fn resolve(token: &str) -> Self {
        Self::resolve_in(token, Path::new(""))
    }

    /// Like [`KeySource::resolve`], with relative file tokens taken from `base`.
    pub fn resolve_in(token: &str, base: &Path) -> Self {
        if let Some(secret) = Secret::from_hex(token) {
            return Self::Secret(secret);
        }
        let path = base.join(token);
        if !path.is_file() {
            return Self::Unusable;
        }
        match fs::read_to_string(&path).ok().map(Zeroizing::new).and_then(|contents| Secret::from_hex(&contents)) {
            Some(secret) => Self::SecretFile(path, secret),
            None => Self::KeyFile(path),
        }
    }

    pub fn secret(&self) -> Option<&Secret> {
        match self {
            Self::Secret(secret) | Self::SecretFile(_, secret) => Some(secret),
            _ => None,
        }
    }
}

/// A reference to an existing key: by store identifier or by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRef {
    Uuid(Uuid),
    Address(Address),
    Unknown,
}

impl KeyRef {
    pub fn parse(token: &str) -> Self {
        if let Ok(uuid) = Uuid::parse_str(token) {
            return Self::Uuid(uuid);
        }
        match token.parse::<Address>() {
            Ok(address) => Self::Address(address),
            Err(_) => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parses_with_and_without_prefix() {
        let a: Address = "0x00c5496aee77c1ba1f0854206a26dda82a81d6d8".parse().unwrap();
        let b: Address = "00c5496aee77c1ba1f0854206a26dda82a81d6d8".parse().unwrap();
        assert_eq!(a, b);
        assert!(a.is_icap_capable());
        assert_eq!(a.abridged(), "00c5496a\u{2026}");
        assert!("00c5".parse::<Address>().is_err());
    }

    #[test]
    fn secret_hex_requires_exactly_32_bytes() {
        assert!(Secret::from_hex(&"11".repeat(32)).is_some());
        assert!(Secret::from_hex(&format!("0x{}", "ab".repeat(32))).is_some());
        assert!(Secret::from_hex(&"11".repeat(31)).is_none());
        assert!(Secret::from_hex("not hex at all").is_none());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::from_bytes([7u8; 32]);
        assert_eq!(format!("{secret:?}"), "Secret([REDACTED])");
    }

    #[test]
    fn key_ref_distinguishes_uuid_and_address() {
        let id = Uuid::new_v4();
        assert_eq!(KeyRef::parse(&id.to_string()), KeyRef::Uuid(id));
        assert!(matches!(KeyRef::parse("0x00c5496aee77c1ba1f0854206a26dda82a81d6d8"), KeyRef::Address(_)));
        assert_eq!(KeyRef::parse("nonsense"), KeyRef::Unknown);
    }

    #[test]
    fn key_source_reads_hex_file_and_falls_back_to_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let hex_file = dir.path().join("secret.txt");
        fs::write(&hex_file, format!("{}\n", "22".repeat(32))).unwrap();
        let other = dir.path().join("key.json");
        fs::write(&other, "{}").unwrap();

        assert!(matches!(KeySource::resolve(hex_file.to_str().unwrap()), KeySource::SecretFile(..)));
        assert!(matches!(KeySource::resolve(other.to_str().unwrap()), KeySource::KeyFile(_)));
        assert!(matches!(KeySource::resolve(dir.path().join("missing").to_str().unwrap()), KeySource::Unusable));
    }

    #[test]
    fn hex_token_wins_over_same_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let token = "11".repeat(32);
        fs::write(dir.path().join(&token), "33".repeat(32)).unwrap();
        fs::write(dir.path().join("key.json"), "{}").unwrap();

        match KeySource::resolve_in(&token, dir.path()) {
            KeySource::Secret(secret) => assert_eq!(hex::encode(secret.as_bytes()), token),
            other => panic!("expected a raw secret, got {other:?}"),
        }
        assert!(matches!(KeySource::resolve_in("key.json", dir.path()), KeySource::KeyFile(p) if p == dir.path().join("key.json")));
    }
}
