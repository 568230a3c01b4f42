//! The bare secret store: one encrypted key file per identifier in a directory.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::constants::*;
use crate::crypto::{self, KdfConfig};
use crate::error::KeyError;
use crate::types::*;
use crate::utils::write_secure_file;

/// Supplies candidate passwords for an existing key; `None` means give up.
pub type PasswordSupplier<'a> = dyn FnMut() -> Option<Zeroizing<String>> + 'a;

pub trait CredentialStore {
    fn keys(&self) -> BTreeSet<Uuid>;

    fn address(&self, id: &Uuid) -> Option<Address>;

    fn import_secret(&mut self, secret: &Secret, password: &str, kdf: &KdfConfig) -> Result<Uuid, KeyError>;

    /// Imports a key file in the store's own format.
    fn import_key(&mut self, path: &Path) -> Result<Uuid, KeyError>;

    fn secret(&self, id: &Uuid, password: &str) -> Result<Secret, KeyError>;

    /// Re-encrypts `id` under `new_password`. `existing` is only called when a
    /// password is needed to decrypt, and again after each wrong one.
    fn recode(&mut self, id: &Uuid, new_password: &str, existing: &mut PasswordSupplier<'_>, kdf: &KdfConfig) -> bool;

    fn export(&self, id: &Uuid) -> Result<String, KeyError>;

    fn kill(&mut self, id: &Uuid) -> Result<(), KeyError>;
}

#[derive(Debug)]
pub struct SecretStore {
    path: PathBuf,
    keys: BTreeMap<Uuid, KeyFile>,
}

impl SecretStore {
    /// Loads every key file under `path`. A missing directory is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KeyError> {
        let path = path.into();
        let mut keys = BTreeMap::new();
        if path.is_dir() {
            for entry in fs::read_dir(&path)? {
                let file = entry?.path();
                if file.extension().and_then(|e| e.to_str()) != Some(KEY_FILE_EXT) {
                    continue;
                }
                match read_key_file(&file) {
                    Ok(key) => {
                        keys.insert(key.id, key);
                    }
                    Err(e) => warn!(file = %file.display(), "skipping unreadable key file: {e}"),
                }
            }
        }
        debug!(path = %path.display(), count = keys.len(), "secret store opened");
        Ok(Self { path, keys })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_for(&self, id: &Uuid) -> PathBuf {
        self.path.join(format!("{}.{KEY_FILE_EXT}", id.hyphenated()))
    }

    fn save(&mut self, key: KeyFile) -> Result<Uuid, KeyError> {
        let json = serde_json::to_string_pretty(&key)?;
        write_secure_file(&self.file_for(&key.id), &json)?;
        let id = key.id;
        self.keys.insert(id, key);
        Ok(id)
    }

    fn unused_id(&self) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if !self.keys.contains_key(&id) {
                return id;
            }
        }
    }
}

fn read_key_file(path: &Path) -> Result<KeyFile, KeyError> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::InvalidData => KeyError::NotKeyFile(path.to_path_buf()),
        _ => KeyError::Io(e),
    })?;
    serde_json::from_str(&contents).map_err(|_| KeyError::NotKeyFile(path.to_path_buf()))
}

impl CredentialStore for SecretStore {
    fn keys(&self) -> BTreeSet<Uuid> {
        self.keys.keys().copied().collect()
    }

    fn address(&self, id: &Uuid) -> Option<Address> {
        self.keys.get(id).map(|k| k.address)
    }

    fn import_secret(&mut self, secret: &Secret, password: &str, kdf: &KdfConfig) -> Result<Uuid, KeyError> {
        let address = crypto::address_of(secret)?;
        let crypto = crypto::encrypt_data(secret.as_bytes(), password, kdf)?;
        let id = self.save(KeyFile { version: KEY_FILE_VERSION, id: self.unused_id(), address, crypto })?;
        info!(%id, "imported secret for {}", address.abridged());
        Ok(id)
    }

    fn import_key(&mut self, path: &Path) -> Result<Uuid, KeyError> {
        let mut key = read_key_file(path)?;
        if self.keys.contains_key(&key.id) {
            key.id = self.unused_id();
        }
        let id = self.save(key)?;
        info!(%id, file = %path.display(), "imported key file");
        Ok(id)
    }

    fn secret(&self, id: &Uuid, password: &str) -> Result<Secret, KeyError> {
        let key = self.keys.get(id).ok_or(KeyError::KeyNotFound(*id))?;
        let plain = crypto::decrypt_data(&key.crypto, password)?;
        Secret::from_slice(&plain).ok_or(KeyError::Decrypt)
    }

    fn recode(&mut self, id: &Uuid, new_password: &str, existing: &mut PasswordSupplier<'_>, kdf: &KdfConfig) -> bool {
        if !self.keys.contains_key(id) {
            return false;
        }
        let secret = loop {
            let Some(password) = existing() else {
                return false;
            };
            match self.secret(id, &password) {
                Ok(secret) => break secret,
                Err(e) => debug!(%id, "recode: {e}"),
            }
        };
        let crypto = match crypto::encrypt_data(secret.as_bytes(), new_password, kdf) {
            Ok(crypto) => crypto,
            Err(e) => {
                warn!(%id, "recode failed: {e}");
                return false;
            }
        };
        let Some(mut key) = self.keys.get(id).cloned() else {
            return false;
        };
        key.crypto = crypto;
        match self.save(key) {
            Ok(_) => {
                info!(%id, kdf = kdf.kdf.name(), "key re-encoded");
                true
            }
            Err(e) => {
                warn!(%id, "recode could not be saved: {e}");
                false
            }
        }
    }

    fn export(&self, id: &Uuid) -> Result<String, KeyError> {
        let key = self.keys.get(id).ok_or(KeyError::KeyNotFound(*id))?;
        Ok(serde_json::to_string_pretty(key)?)
    }

    fn kill(&mut self, id: &Uuid) -> Result<(), KeyError> {
        if self.keys.remove(id).is_none() {
            return Err(KeyError::KeyNotFound(*id));
        }
        let file = self.file_for(id);
        if file.exists() {
            fs::remove_file(&file)?;
        }
        info!(%id, "key removed");
        Ok(())
    }
}
