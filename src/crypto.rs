use aes_gcm::{Aes256Gcm, Nonce, aead::{Aead, KeyInit}};
use k256::{FieldBytes, ecdsa::SigningKey, sha2::Sha256};
use scrypt::{Params, password_hash::rand_core::{OsRng, RngCore}};
use std::collections::BTreeMap;
use tiny_keccak::{Hasher, Keccak};
use tracing::debug;
use zeroize::Zeroizing;

use crate::constants::*;
use crate::error::KeyError;
use crate::types::*;

/// Key-derivation algorithm used to protect a stored secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kdf {
    Scrypt,
    Pbkdf2Sha256,
}

impl Kdf {
    /// Total mapping: `"pbkdf2"` selects PBKDF2-SHA256, anything else scrypt.
    pub fn from_name(name: &str) -> Self {
        if name == "pbkdf2" { Kdf::Pbkdf2Sha256 } else { Kdf::Scrypt }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kdf::Scrypt => "scrypt",
            Kdf::Pbkdf2Sha256 => "pbkdf2",
        }
    }
}

/// KDF choice plus the cost parameters used for new ciphertexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfConfig {
    pub kdf: Kdf,
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
    pub iterations: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self { kdf: Kdf::Scrypt, log_n: SCRYPT_LOG_N, r: SCRYPT_R, p: SCRYPT_P, iterations: PBKDF2_ITERATIONS }
    }
}

impl KdfConfig {
    /// Applies `--kdf-param` pairs on top of the defaults for `kdf`.
    pub fn from_params(kdf: Kdf, params: &BTreeMap<String, String>) -> Result<Self, KeyError> {
        let mut config = Self { kdf, ..Self::default() };
        for (name, value) in params {
            let bad = || KeyError::KdfParam { name: name.clone(), value: value.clone() };
            let parsed: u32 = value.parse().map_err(|_| bad())?;
            match (kdf, name.as_str()) {
                (Kdf::Scrypt, "n") if parsed >= 2 && parsed.is_power_of_two() => config.log_n = parsed.trailing_zeros() as u8,
                (Kdf::Scrypt, "log_n") if (1..32).contains(&parsed) => config.log_n = parsed as u8,
                (Kdf::Scrypt, "r") if parsed > 0 => config.r = parsed,
                (Kdf::Scrypt, "p") if parsed > 0 => config.p = parsed,
                (Kdf::Pbkdf2Sha256, "c" | "iterations") if parsed > 0 => config.iterations = parsed,
                (_, "dklen") if parsed as usize == DERIVED_KEY_LEN => {}
                _ => return Err(bad()),
            }
        }
        if kdf == Kdf::Scrypt {
            Params::new(config.log_n, config.r, config.p, DERIVED_KEY_LEN).map_err(|e| KeyError::Kdf(e.to_string()))?;
        }
        Ok(config)
    }

    fn fresh_params(&self) -> Result<KdfParams, KeyError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let salt = hex::encode(salt);
        Ok(match self.kdf {
            Kdf::Scrypt => {
                let n = 1u32.checked_shl(u32::from(self.log_n)).ok_or_else(|| KeyError::Kdf(format!("scrypt log_n {} out of range", self.log_n)))?;
                KdfParams::Scrypt { dklen: DERIVED_KEY_LEN, n, r: self.r, p: self.p, salt }
            }
            Kdf::Pbkdf2Sha256 => KdfParams::Pbkdf2 { dklen: DERIVED_KEY_LEN, c: self.iterations, prf: PBKDF2_PRF.to_string(), salt },
        })
    }
}

fn derive_key(password: &str, params: &KdfParams) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>, KeyError> {
    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    match params {
        KdfParams::Scrypt { dklen, n, r, p, salt } => {
            if *dklen != DERIVED_KEY_LEN || !n.is_power_of_two() {
                return Err(KeyError::Kdf(format!("unsupported scrypt parameters n={n} dklen={dklen}")));
            }
            let salt = hex::decode(salt).map_err(|e| KeyError::Kdf(format!("bad salt: {e}")))?;
            let params = Params::new(n.trailing_zeros() as u8, *r, *p, DERIVED_KEY_LEN).map_err(|e| KeyError::Kdf(e.to_string()))?;
            scrypt::scrypt(password.as_bytes(), &salt, &params, key.as_mut()).map_err(|e| KeyError::Kdf(e.to_string()))?;
        }
        KdfParams::Pbkdf2 { dklen, c, prf, salt } => {
            if *dklen != DERIVED_KEY_LEN || prf != PBKDF2_PRF {
                return Err(KeyError::Kdf(format!("unsupported pbkdf2 parameters prf={prf} dklen={dklen}")));
            }
            let salt = hex::decode(salt).map_err(|e| KeyError::Kdf(format!("bad salt: {e}")))?;
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, *c, key.as_mut());
        }
    }
    Ok(key)
}

pub fn encrypt_data(data: &[u8], password: &str, config: &KdfConfig) -> Result<EncryptedData, KeyError> {
    let kdfparams = config.fresh_params()?;
    let key = derive_key(password, &kdfparams)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_ref()).map_err(|e| KeyError::Cipher(e.to_string()))?;
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let sealed = cipher.encrypt(Nonce::from_slice(&iv), data).map_err(|e| KeyError::Cipher(e.to_string()))?;
    let tag_start = sealed.len() - TAG_LEN;
    debug!(kdf = config.kdf.name(), "sealed {} bytes", data.len());
    Ok(EncryptedData {
        cipher: CIPHER_NAME.to_string(),
        ciphertext: hex::encode(&sealed[..tag_start]),
        iv: hex::encode(iv),
        tag: hex::encode(&sealed[tag_start..]),
        kdf: config.kdf.name().to_string(),
        kdfparams,
    })
}

pub fn decrypt_data(encrypted: &EncryptedData, password: &str) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    if encrypted.cipher != CIPHER_NAME {
        return Err(KeyError::Cipher(format!("unsupported cipher {}", encrypted.cipher)));
    }
    let iv = hex::decode(&encrypted.iv).map_err(|_| KeyError::Decrypt)?;
    let iv: [u8; IV_LEN] = iv.as_slice().try_into().map_err(|_| KeyError::Decrypt)?;
    let mut sealed = hex::decode(&encrypted.ciphertext).map_err(|_| KeyError::Decrypt)?;
    let tag = hex::decode(&encrypted.tag).map_err(|_| KeyError::Decrypt)?;
    if tag.len() != TAG_LEN {
        return Err(KeyError::Decrypt);
    }
    sealed.extend_from_slice(&tag);
    let key = derive_key(password, &encrypted.kdfparams)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_ref()).map_err(|e| KeyError::Cipher(e.to_string()))?;
    let plaintext = cipher.decrypt(Nonce::from_slice(&iv), sealed.as_ref()).map_err(|_| KeyError::Decrypt)?;
    Ok(Zeroizing::new(plaintext))
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}

/// Address of a secret: last 20 bytes of keccak-256 over the uncompressed public key.
pub fn address_of(secret: &Secret) -> Result<Address, KeyError> {
    let signing_key = SigningKey::from_bytes(FieldBytes::from_slice(secret.as_bytes())).map_err(|_| KeyError::InvalidSecret)?;
    let public = signing_key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&public.as_bytes()[1..]);
    let mut address = [0u8; ADDRESS_LEN];
    address.copy_from_slice(&hash[32 - ADDRESS_LEN..]);
    Ok(Address::from_bytes(address))
}

pub fn random_secret() -> Secret {
    let mut bytes = Zeroizing::new([0u8; SECRET_LEN]);
    OsRng.fill_bytes(bytes.as_mut());
    Secret::from_bytes(*bytes)
}

/// Draws a random key. With `icap`, re-hashes the secret until the address
/// starts with a zero byte, giving up after `max_rounds` re-hashes.
pub fn make_key(icap: bool, max_rounds: u32) -> Result<KeyPair, KeyError> {
    let mut secret = random_secret();
    let mut rounds = 0u32;
    loop {
        if let Ok(address) = address_of(&secret) {
            if !icap || address.is_icap_capable() {
                debug!(rounds, "generated key {}", address.abridged());
                return Ok(KeyPair { secret, address });
            }
        }
        if rounds >= max_rounds {
            return Err(KeyError::IcapExhausted(max_rounds));
        }
        rounds += 1;
        secret = Secret::from_bytes(keccak256(secret.as_bytes()));
    }
}

#[cfg(test)]
pub(crate) fn cheap_kdf(kdf: Kdf) -> KdfConfig {
    KdfConfig { kdf, log_n: 4, r: 8, p: 1, iterations: 8 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_name_mapping_is_total() {
        assert_eq!(Kdf::from_name("pbkdf2"), Kdf::Pbkdf2Sha256);
        assert_eq!(Kdf::from_name("scrypt"), Kdf::Scrypt);
        assert_eq!(Kdf::from_name("bcrypt"), Kdf::Scrypt);
        assert_eq!(Kdf::from_name(""), Kdf::Scrypt);
    }

    #[test]
    fn kdf_params_are_validated() {
        let mut params = BTreeMap::new();
        params.insert("n".to_string(), "1024".to_string());
        params.insert("r".to_string(), "4".to_string());
        let config = KdfConfig::from_params(Kdf::Scrypt, &params).unwrap();
        assert_eq!((config.log_n, config.r, config.p), (10, 4, SCRYPT_P));

        params.insert("n".to_string(), "1000".to_string());
        assert!(matches!(KdfConfig::from_params(Kdf::Scrypt, &params), Err(KeyError::KdfParam { .. })));

        let mut params = BTreeMap::new();
        params.insert("c".to_string(), "5000".to_string());
        assert_eq!(KdfConfig::from_params(Kdf::Pbkdf2Sha256, &params).unwrap().iterations, 5000);
        assert!(KdfConfig::from_params(Kdf::Scrypt, &params).is_err());

        for log_n in ["32", "40", "63"] {
            let params = BTreeMap::from([("log_n".to_string(), log_n.to_string())]);
            assert!(matches!(KdfConfig::from_params(Kdf::Scrypt, &params), Err(KeyError::KdfParam { .. })), "log_n={log_n}");
        }

        let params = BTreeMap::from([("r".to_string(), "1073741824".to_string())]);
        assert!(matches!(KdfConfig::from_params(Kdf::Scrypt, &params), Err(KeyError::Kdf(_))));
    }

    #[test]
    fn oversized_log_n_is_an_error_not_a_panic() {
        let config = KdfConfig { log_n: 40, ..cheap_kdf(Kdf::Scrypt) };
        assert!(matches!(encrypt_data(b"payload", "pw", &config), Err(KeyError::Kdf(_))));
    }

    #[test]
    fn encrypt_decrypt_with_both_kdfs() {
        for kdf in [Kdf::Scrypt, Kdf::Pbkdf2Sha256] {
            let sealed = encrypt_data(b"payload", "hunter2", &cheap_kdf(kdf)).unwrap();
            assert_eq!(sealed.kdf, kdf.name());
            assert_eq!(&*decrypt_data(&sealed, "hunter2").unwrap(), b"payload");
            assert!(matches!(decrypt_data(&sealed, "wrong"), Err(KeyError::Decrypt)));
        }
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let mut sealed = encrypt_data(b"payload", "pw", &cheap_kdf(Kdf::Scrypt)).unwrap();
        sealed.tag = "00".repeat(TAG_LEN);
        assert!(matches!(decrypt_data(&sealed, "pw"), Err(KeyError::Decrypt)));
    }

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(hex::encode(keccak256(b"")), "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");
    }

    #[test]
    fn address_of_secret_one() {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let address = address_of(&Secret::from_bytes(bytes)).unwrap();
        assert_eq!(address.hex(), "7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    }

    #[test]
    fn zero_secret_is_invalid() {
        assert!(matches!(address_of(&Secret::from_bytes([0u8; 32])), Err(KeyError::InvalidSecret)));
    }

    #[test]
    fn icap_keys_have_leading_zero_byte() {
        for _ in 0..3 {
            let key = make_key(true, ICAP_ROUNDS).unwrap();
            assert_eq!(key.address.as_bytes()[0], 0);
            assert_eq!(address_of(&key.secret).unwrap(), key.address);
        }
    }

    #[test]
    fn non_icap_keys_are_unconstrained() {
        let seen_nonzero = (0..16).map(|_| make_key(false, 0).unwrap()).any(|k| k.address.as_bytes()[0] != 0);
        assert!(seen_nonzero);
    }

    #[test]
    fn icap_search_is_bounded() {
        // With zero re-hash rounds only a lucky first draw succeeds.
        let failures = (0..8).filter(|_| matches!(make_key(true, 0), Err(KeyError::IcapExhausted(0)))).count();
        assert!(failures > 0);
    }
}
