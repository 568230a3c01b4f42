//! The named-account layer: a master-password sealed registry over a [`SecretStore`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use scrypt::password_hash::rand_core::{OsRng, RngCore};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::constants::*;
use crate::crypto::{self, KdfConfig};
use crate::error::KeyError;
use crate::store::{CredentialStore, PasswordSupplier, SecretStore};
use crate::types::*;
use crate::utils::write_secure_file;

pub trait Wallet {
    fn exists(&self) -> bool;

    /// Unlocks the wallet. Any failure, including a wrong password, is `false`.
    fn load(&mut self, password: &str) -> bool;

    /// Initializes an empty wallet sealed with `password` and leaves it unlocked.
    fn create(&mut self, password: &str) -> Result<(), KeyError>;

    /// Address to (name, hint). Empty while locked.
    fn account_details(&self) -> BTreeMap<Address, (String, String)>;

    fn have_hint(&self, password: &str) -> bool;

    fn resolve(&self, key: &KeyRef) -> Option<(Uuid, Address)>;

    fn import_secret(&mut self, secret: &Secret, name: &str, password: &str, hint: &str, kdf: &KdfConfig) -> Result<Address, KeyError>;

    fn import_key(&mut self, path: &Path, name: &str) -> Result<Address, KeyError>;

    /// Registers a key that is already in the secret store.
    fn import_existing(&mut self, id: &Uuid, name: &str) -> Result<Address, KeyError>;

    fn export(&self, address: &Address) -> Result<String, KeyError>;

    fn recode(&mut self, address: &Address, new_password: &str, hint: &str, existing: &mut PasswordSupplier<'_>, kdf: &KdfConfig) -> bool;

    fn kill(&mut self, address: &Address) -> Result<(), KeyError>;
}

pub struct KeyManager {
    path: PathBuf,
    store: SecretStore,
    kdf: KdfConfig,
    created_at: Option<String>,
    master: Option<Zeroizing<String>>,
    registry: Option<Registry>,
}

impl KeyManager {
    /// Binds a wallet file to a secret store. Nothing is unlocked yet.
    pub fn new(wallet_path: impl Into<PathBuf>, secrets_path: impl Into<PathBuf>, kdf: KdfConfig) -> Result<Self, KeyError> {
        Ok(Self { path: wallet_path.into(), store: SecretStore::open(secrets_path)?, kdf, created_at: None, master: None, registry: None })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &SecretStore {
        &self.store
    }

    pub fn is_unlocked(&self) -> bool {
        self.registry.is_some()
    }

    fn registry(&self) -> Result<&Registry, KeyError> {
        self.registry.as_ref().ok_or(KeyError::Locked)
    }

    fn registry_mut(&mut self) -> Result<&mut Registry, KeyError> {
        self.registry.as_mut().ok_or(KeyError::Locked)
    }

    fn account(&self, address: &Address) -> Result<&AccountInfo, KeyError> {
        self.registry()?.accounts.iter().find(|a| a.address == *address).ok_or(KeyError::AccountNotFound(*address))
    }

    fn check_unregistered(&self, address: &Address) -> Result<(), KeyError> {
        if self.registry()?.accounts.iter().any(|a| a.address == *address) {
            return Err(KeyError::AlreadyRegistered(*address));
        }
        Ok(())
    }

    fn password_hash(&self, password: &str) -> Result<String, KeyError> {
        let registry = self.registry()?;
        let mut salted = Zeroizing::new(hex::decode(&registry.salt).map_err(|e| KeyError::Kdf(format!("bad wallet salt: {e}")))?);
        salted.extend_from_slice(password.as_bytes());
        Ok(hex::encode(crypto::keccak256(&salted)))
    }

    fn read(&self, password: &str) -> Result<(WalletFile, Registry), KeyError> {
        let file: WalletFile = serde_json::from_str(&fs::read_to_string(&self.path)?)?;
        let plain = crypto::decrypt_data(&file.registry, password)?;
        let registry = serde_json::from_slice(&plain)?;
        Ok((file, registry))
    }

    fn save(&self) -> Result<(), KeyError> {
        let master = self.master.as_ref().ok_or(KeyError::Locked)?;
        let plain = Zeroizing::new(serde_json::to_vec(self.registry()?)?);
        let file = WalletFile {
            version: WALLET_VERSION,
            created_at: self.created_at.clone().unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            registry: crypto::encrypt_data(&plain, master, &self.kdf)?,
        };
        write_secure_file(&self.path, &serde_json::to_string_pretty(&file)?)?;
        debug!(path = %self.path.display(), "wallet saved");
        Ok(())
    }

    fn register(&mut self, id: Uuid, address: Address, name: &str, password_hash: String) -> Result<(), KeyError> {
        self.registry_mut()?.accounts.push(AccountInfo { uuid: id, address, name: name.to_string(), password_hash });
        self.save()?;
        info!(%id, "registered {} as {name:?}", address.abridged());
        Ok(())
    }

    fn remember_hint(&mut self, password_hash: &str, hint: &str) -> Result<(), KeyError> {
        if !hint.is_empty() {
            self.registry_mut()?.hints.insert(password_hash.to_string(), hint.to_string());
        }
        Ok(())
    }
}

impl Wallet for KeyManager {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&mut self, password: &str) -> bool {
        match self.read(password) {
            Ok((file, registry)) => {
                debug!(accounts = registry.accounts.len(), "wallet unlocked");
                self.created_at = Some(file.created_at);
                self.registry = Some(registry);
                self.master = Some(Zeroizing::new(password.to_string()));
                true
            }
            Err(e) => {
                debug!("wallet not unlocked: {e}");
                false
            }
        }
    }

    fn create(&mut self, password: &str) -> Result<(), KeyError> {
        if password.is_empty() {
            return Err(KeyError::EmptyPassword);
        }
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        self.registry = Some(Registry { salt: hex::encode(salt), ..Registry::default() });
        self.master = Some(Zeroizing::new(password.to_string()));
        self.created_at = Some(chrono::Utc::now().to_rfc3339());
        self.save()?;
        info!(path = %self.path.display(), "wallet created");
        Ok(())
    }

    fn account_details(&self) -> BTreeMap<Address, (String, String)> {
        let Some(registry) = &self.registry else {
            return BTreeMap::new();
        };
        registry
            .accounts
            .iter()
            .map(|a| (a.address, (a.name.clone(), registry.hints.get(&a.password_hash).cloned().unwrap_or_default())))
            .collect()
    }

    fn have_hint(&self, password: &str) -> bool {
        match (self.password_hash(password), &self.registry) {
            (Ok(hash), Some(registry)) => registry.hints.contains_key(&hash),
            _ => false,
        }
    }

    fn resolve(&self, key: &KeyRef) -> Option<(Uuid, Address)> {
        let accounts = &self.registry.as_ref()?.accounts;
        let found = match key {
            KeyRef::Uuid(id) => accounts.iter().find(|a| a.uuid == *id),
            KeyRef::Address(address) => accounts.iter().find(|a| a.address == *address),
            KeyRef::Unknown => None,
        };
        found.map(|a| (a.uuid, a.address))
    }

    fn import_secret(&mut self, secret: &Secret, name: &str, password: &str, hint: &str, kdf: &KdfConfig) -> Result<Address, KeyError> {
        let address = crypto::address_of(secret)?;
        self.check_unregistered(&address)?;
        let hash = self.password_hash(password)?;
        let id = self.store.import_secret(secret, password, kdf)?;
        self.remember_hint(&hash, hint)?;
        self.register(id, address, name, hash)?;
        Ok(address)
    }

    fn import_key(&mut self, path: &Path, name: &str) -> Result<Address, KeyError> {
        self.registry()?;
        let id = self.store.import_key(path)?;
        let address = self.store.address(&id).ok_or(KeyError::KeyNotFound(id))?;
        if let Err(e) = self.check_unregistered(&address) {
            self.store.kill(&id)?;
            return Err(e);
        }
        self.register(id, address, name, String::new())?;
        Ok(address)
    }

    fn import_existing(&mut self, id: &Uuid, name: &str) -> Result<Address, KeyError> {
        let address = self.store.address(id).ok_or(KeyError::KeyNotFound(*id))?;
        self.check_unregistered(&address)?;
        self.register(*id, address, name, String::new())?;
        Ok(address)
    }

    fn export(&self, address: &Address) -> Result<String, KeyError> {
        let account = self.account(address)?;
        self.store.export(&account.uuid)
    }

    fn recode(&mut self, address: &Address, new_password: &str, hint: &str, existing: &mut PasswordSupplier<'_>, kdf: &KdfConfig) -> bool {
        let (id, hash) = match (self.account(address), self.password_hash(new_password)) {
            (Ok(account), Ok(hash)) => (account.uuid, hash),
            _ => return false,
        };
        if !self.store.recode(&id, new_password, existing, kdf) {
            return false;
        }
        let updated = self.remember_hint(&hash, hint).and_then(|()| {
            let account = self.registry_mut()?.accounts.iter_mut().find(|a| a.uuid == id).ok_or(KeyError::KeyNotFound(id))?;
            account.password_hash = hash;
            self.save()
        });
        match updated {
            Ok(()) => true,
            Err(e) => {
                warn!(%id, "key re-encoded but wallet not updated: {e}");
                false
            }
        }
    }

    fn kill(&mut self, address: &Address) -> Result<(), KeyError> {
        let id = self.account(address)?.uuid;
        self.registry_mut()?.accounts.retain(|a| a.uuid != id);
        match self.store.kill(&id) {
            Ok(()) | Err(KeyError::KeyNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.save()?;
        info!(%id, "killed {}", address.abridged());
        Ok(())
    }
}
