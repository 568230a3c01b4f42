//! Runs the one operation a [`Session`] selects against the secret store or the wallet.

use std::io::Write;

use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::commands::{OperationMode, Session};
use crate::constants::*;
use crate::crypto::{self, KdfConfig};
use crate::error::{ExecError, KeyError};
use crate::icap;
use crate::prompt::{PasswordSource, account_password, create_password, create_password_with_hint};
use crate::store::{CredentialStore, PasswordSupplier, SecretStore};
use crate::types::*;
use crate::wallet::{KeyManager, Wallet};

/// Caps on the loops that would otherwise wait on a human or on luck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub unlock_attempts: usize,
    pub icap_rounds: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self { unlock_attempts: UNLOCK_ATTEMPTS, icap_rounds: ICAP_ROUNDS }
    }
}

pub struct Executor<'a, O: Write, E: Write> {
    session: Session,
    prompter: &'a mut dyn PasswordSource,
    out: O,
    err: E,
    limits: Limits,
}

impl<'a, O: Write, E: Write> Executor<'a, O, E> {
    pub fn new(session: Session, prompter: &'a mut dyn PasswordSource, out: O, err: E) -> Self {
        Self { session, prompter, out, err, limits: Limits::default() }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn into_output(self) -> (O, E) {
        (self.out, self.err)
    }

    /// Opens the file-backed store or wallet the session points at and runs the operation.
    pub fn execute(&mut self) -> Result<(), ExecError> {
        let kdf = match self.session.kdf_config() {
            Ok(kdf) => kdf,
            Err(e) => {
                writeln!(self.err, "{e}")?;
                return Ok(());
            }
        };
        let mode = self.session.mode;
        info!(?mode, "executing");
        match mode {
            OperationMode::None => Ok(()),
            _ if mode.is_bare() => {
                let mut store = SecretStore::open(self.session.secrets_path.clone())?;
                self.execute_bare(&mut store)
            }
            _ => {
                let mut wallet = KeyManager::new(self.session.wallet_path.clone(), self.session.secrets_path.clone(), kdf)?;
                if mode == OperationMode::CreateWallet {
                    self.create_wallet(&mut wallet)
                } else {
                    self.execute_wallet(&mut wallet)
                }
            }
        }
    }

    pub fn execute_bare(&mut self, store: &mut dyn CredentialStore) -> Result<(), ExecError> {
        let kdf = self.session.kdf_config()?;
        match self.session.mode {
            OperationMode::ListBare => {
                for id in store.keys() {
                    writeln!(self.out, "{}", id.hyphenated())?;
                }
            }
            OperationMode::NewBare => self.new_bare(store, &kdf)?,
            OperationMode::ImportBare => self.import_bare(store, &kdf)?,
            OperationMode::RecodeBare => self.recode_bare(store, &kdf)?,
            OperationMode::ExportBare => {}
            mode => debug!(?mode, "not a bare operation"),
        }
        Ok(())
    }

    pub fn create_wallet(&mut self, wallet: &mut dyn Wallet) -> Result<(), ExecError> {
        if wallet.exists() {
            writeln!(self.err, "A wallet already exists; not overwriting it.")?;
            return Ok(());
        }
        let password = if self.session.master_password.is_empty() {
            create_password(&mut *self.prompter, &mut self.out, MASTER_CREATE_PROMPT)?
        } else {
            self.session.master_password.clone()
        };
        if password.is_empty() {
            return self.fail(KeyError::EmptyPassword);
        }
        match wallet.create(&password) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    /// Unlocks `wallet` and runs the selected wallet operation. A missing wallet is fatal.
    pub fn execute_wallet(&mut self, wallet: &mut dyn Wallet) -> Result<(), ExecError> {
        if !wallet.exists() {
            writeln!(self.err, "{}", ExecError::WalletMissing)?;
            return Err(ExecError::WalletMissing);
        }
        self.unlock(wallet)?;
        let kdf = self.session.kdf_config()?;
        match self.session.mode {
            OperationMode::List => self.list(wallet)?,
            OperationMode::New => self.new_account(wallet, &kdf)?,
            OperationMode::Import => self.import(wallet, &kdf)?,
            OperationMode::Export => self.export(wallet)?,
            OperationMode::Recode => self.recode(wallet, &kdf)?,
            OperationMode::Kill => self.kill(wallet)?,
            mode => debug!(?mode, "not a wallet operation"),
        }
        Ok(())
    }

    fn unlock(&mut self, wallet: &mut dyn Wallet) -> Result<(), ExecError> {
        let mut password = self.session.master_password.clone();
        for attempt in 0..self.limits.unlock_attempts {
            if password.is_empty() {
                password = self.prompter.password(MASTER_PROMPT)?;
            }
            if !password.is_empty() {
                if wallet.load(&password) {
                    debug!(attempt, "wallet unlocked");
                    return Ok(());
                }
                writeln!(self.out, "Password invalid. Try again.")?;
            }
            password = Zeroizing::default();
        }
        Err(ExecError::Unlock(self.limits.unlock_attempts))
    }

    /// Reports a per-item failure and carries on. Only a dead prompt aborts.
    fn fail(&mut self, e: KeyError) -> Result<(), ExecError> {
        match e {
            KeyError::Prompt(_) => Err(e.into()),
            e => {
                writeln!(self.err, "{e}")?;
                Ok(())
            }
        }
    }

    fn lock_password(&mut self, prompt: &str) -> Result<Zeroizing<String>, KeyError> {
        let password = if self.session.lock.is_empty() {
            create_password(&mut *self.prompter, &mut self.out, prompt)?
        } else {
            self.session.lock.clone()
        };
        if password.is_empty() {
            return Err(KeyError::EmptyPassword);
        }
        Ok(password)
    }

    fn wallet_lock_password(&mut self, wallet: &dyn Wallet, prompt: &str) -> Result<(Zeroizing<String>, String), KeyError> {
        let (password, hint) = if self.session.lock.is_empty() {
            create_password_with_hint(&mut *self.prompter, &mut self.out, prompt, &|p: &str| wallet.have_hint(p))?
        } else {
            (self.session.lock.clone(), String::new())
        };
        if password.is_empty() {
            return Err(KeyError::EmptyPassword);
        }
        Ok((password, hint))
    }

    /// Feeds `recode` the `--unlock` passwords in order, then one answer from `ask`.
    fn with_existing_passwords(
        &mut self,
        ask: impl FnOnce(&mut dyn PasswordSource) -> Result<Zeroizing<String>, KeyError>,
        recode: impl FnOnce(&mut PasswordSupplier<'_>) -> bool,
    ) -> Result<bool, ExecError> {
        let mut unlocks = self.session.unlocks.iter().cloned();
        let prompter = &mut *self.prompter;
        let mut ask = Some(ask);
        let mut failure = None;
        let mut supplier = || {
            if let Some(password) = unlocks.next() {
                return Some(password);
            }
            let ask = ask.take()?;
            match ask(&mut *prompter) {
                Ok(password) => Some(password),
                Err(e) => {
                    failure = Some(e);
                    None
                }
            }
        };
        let existing: &mut PasswordSupplier<'_> = &mut supplier;
        let recoded = recode(existing);
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(recoded),
        }
    }

    fn make_key(&self) -> Result<KeyPair, KeyError> {
        crypto::make_key(self.session.icap, self.limits.icap_rounds)
    }

    fn write_icap(&mut self, indent: &str, address: &Address) -> Result<(), ExecError> {
        match icap::encode(address) {
            Ok(encoded) => writeln!(self.out, "{indent}ICAP: {encoded}")?,
            Err(_) => writeln!(self.out, "{indent}ICAP: - (not direct-ICAP capable)")?,
        }
        Ok(())
    }

    fn new_bare(&mut self, store: &mut dyn CredentialStore, kdf: &KdfConfig) -> Result<(), ExecError> {
        let lock = match self.lock_password(NEW_KEY_PROMPT) {
            Ok(lock) => lock,
            Err(e) => return self.fail(e),
        };
        let key = match self.make_key() {
            Ok(key) => key,
            Err(e) => return self.fail(e),
        };
        match store.import_secret(&key.secret, &lock, kdf) {
            Ok(id) => {
                writeln!(self.out, "Created key {}", key.address.abridged())?;
                writeln!(self.out, "UUID: {}", id.hyphenated())?;
                writeln!(self.out, "Address: {}", key.address.hex())?;
                self.write_icap("", &key.address)
            }
            Err(e) => self.fail(e),
        }
    }

    fn import_bare(&mut self, store: &mut dyn CredentialStore, kdf: &KdfConfig) -> Result<(), ExecError> {
        for input in self.session.inputs.clone() {
            let imported = match KeySource::resolve(&input) {
                KeySource::Unusable => {
                    writeln!(self.err, "Cannot import {input} not a file or secret.")?;
                    continue;
                }
                KeySource::KeyFile(path) => store.import_key(&path),
                source => match source.secret() {
                    Some(secret) => self.import_secret_bare(store, secret, kdf),
                    None => continue,
                },
            };
            match imported {
                Ok(id) => writeln!(self.out, "Successfully imported {input} as {}", id.hyphenated())?,
                Err(e) => self.report_import(&input, e)?,
            }
        }
        Ok(())
    }

    /// Names the input a failed import came from. Only a dead prompt aborts.
    fn report_import(&mut self, input: &str, e: KeyError) -> Result<(), ExecError> {
        match e {
            KeyError::Prompt(_) => Err(e.into()),
            KeyError::NotKeyFile(_) | KeyError::InvalidSecret => {
                writeln!(self.err, "Cannot import {input} not a file or secret.")?;
                Ok(())
            }
            e => {
                writeln!(self.err, "Cannot import {input}: {e}")?;
                Ok(())
            }
        }
    }

    fn import_secret_bare(&mut self, store: &mut dyn CredentialStore, secret: &Secret, kdf: &KdfConfig) -> Result<Uuid, KeyError> {
        let address = crypto::address_of(secret)?;
        let lock = self.lock_password(&format!("Enter a password with which to secure account {}: ", address.abridged()))?;
        store.import_secret(secret, &lock, kdf)
    }

    fn recode_bare(&mut self, store: &mut dyn CredentialStore, kdf: &KdfConfig) -> Result<(), ExecError> {
        let known = store.keys();
        for input in self.session.inputs.clone() {
            let id = match Uuid::parse_str(&input) {
                Ok(id) if known.contains(&id) => id,
                _ => {
                    writeln!(self.err, "Couldn't re-encode {input}; not found.")?;
                    continue;
                }
            };
            let lock = match self.lock_password(&format!("Enter a password with which to secure account {id}: ")) {
                Ok(lock) => lock,
                Err(e) => {
                    self.fail(e)?;
                    continue;
                }
            };
            let prompt = format!("Enter password for key {id}: ");
            let recoded = self.with_existing_passwords(|p| p.password(&prompt), |existing| store.recode(&id, &lock, existing, kdf))?;
            self.report_recode(&id, recoded)?;
        }
        Ok(())
    }

    fn report_recode(&mut self, id: &Uuid, recoded: bool) -> Result<(), ExecError> {
        if recoded {
            writeln!(self.err, "Re-encoded {id}")?;
        } else {
            writeln!(self.err, "Couldn't re-encode {id}; key corrupt or incorrect password supplied.")?;
        }
        Ok(())
    }

    fn list(&mut self, wallet: &mut dyn Wallet) -> Result<(), ExecError> {
        let details = wallet.account_details();
        if details.is_empty() {
            writeln!(self.out, "No keys found.")?;
        }
        for (address, (name, hint)) in &details {
            let id = wallet.resolve(&KeyRef::Address(*address)).map(|(id, _)| id.to_string()).unwrap_or_default();
            let icap = icap::encode(address).unwrap_or_else(|_| "-".to_string());
            write!(self.out, "{id} {} {icap} {name}", address.hex())?;
            if !hint.is_empty() {
                write!(self.out, " (hint: {hint})")?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn new_account(&mut self, wallet: &mut dyn Wallet, kdf: &KdfConfig) -> Result<(), ExecError> {
        let (lock, hint) = match self.wallet_lock_password(&*wallet, NEW_KEY_PROMPT) {
            Ok(pair) => pair,
            Err(e) => return self.fail(e),
        };
        let key = match self.make_key() {
            Ok(key) => key,
            Err(e) => return self.fail(e),
        };
        let name = self.session.name.clone();
        let address = match wallet.import_secret(&key.secret, &name, &lock, &hint, kdf) {
            Ok(address) => address,
            Err(e) => return self.fail(e),
        };
        let id = wallet.resolve(&KeyRef::Address(address)).map(|(id, _)| id.to_string()).unwrap_or_default();
        writeln!(self.out, "Created key {id}")?;
        writeln!(self.out, "  Name: {name}")?;
        writeln!(self.out, "  Address: {}", address.hex())?;
        self.write_icap("  ", &address)
    }

    fn import(&mut self, wallet: &mut dyn Wallet, kdf: &KdfConfig) -> Result<(), ExecError> {
        let Some(input) = self.session.inputs.first().cloned() else { return Ok(()) };
        let name = self.session.name.clone();
        let imported = match KeySource::resolve(&input) {
            KeySource::Unusable => match Uuid::parse_str(&input) {
                Ok(id) => wallet.import_existing(&id, &name),
                Err(_) => {
                    writeln!(self.err, "Cannot import {input} not a file or secret.")?;
                    return Ok(());
                }
            },
            KeySource::KeyFile(path) => wallet.import_key(&path, &name),
            source => match source.secret() {
                Some(secret) => self.import_secret(wallet, secret, &name, kdf),
                None => return Ok(()),
            },
        };
        match imported {
            Ok(address) => writeln!(self.out, "Successfully imported {input} as {}", address.hex())?,
            Err(e) => self.report_import(&input, e)?,
        }
        Ok(())
    }

    fn import_secret(&mut self, wallet: &mut dyn Wallet, secret: &Secret, name: &str, kdf: &KdfConfig) -> Result<Address, KeyError> {
        let address = crypto::address_of(secret)?;
        let prompt = format!("Enter a password with which to secure account {}: ", address.abridged());
        let (lock, hint) = self.wallet_lock_password(&*wallet, &prompt)?;
        wallet.import_secret(secret, name, &lock, &hint, kdf)
    }

    fn export(&mut self, wallet: &mut dyn Wallet) -> Result<(), ExecError> {
        for input in self.session.inputs.clone() {
            let Some((_, address)) = wallet.resolve(&KeyRef::parse(&input)) else {
                writeln!(self.err, "Couldn't export {input}; not found.")?;
                continue;
            };
            match wallet.export(&address) {
                Ok(json) => writeln!(self.out, "{json}")?,
                Err(e) => self.fail(e)?,
            }
        }
        Ok(())
    }

    fn recode(&mut self, wallet: &mut dyn Wallet, kdf: &KdfConfig) -> Result<(), ExecError> {
        let details = wallet.account_details();
        for input in self.session.inputs.clone() {
            let Some((id, address)) = wallet.resolve(&KeyRef::parse(&input)) else {
                writeln!(self.err, "Couldn't re-encode {input}; not found.")?;
                continue;
            };
            let prompt = format!("Enter a password with which to secure account {}: ", address.abridged());
            let (lock, hint) = match self.wallet_lock_password(&*wallet, &prompt) {
                Ok(pair) => pair,
                Err(e) => {
                    self.fail(e)?;
                    continue;
                }
            };
            let recoded = self.with_existing_passwords(
                |p| account_password(p, &address, details.get(&address)),
                |existing| wallet.recode(&address, &lock, &hint, existing, kdf),
            )?;
            self.report_recode(&id, recoded)?;
        }
        Ok(())
    }

    fn kill(&mut self, wallet: &mut dyn Wallet) -> Result<(), ExecError> {
        for input in self.session.inputs.clone() {
            let Some((_, address)) = wallet.resolve(&KeyRef::parse(&input)) else {
                writeln!(self.err, "Couldn't kill {input}; not found.")?;
                continue;
            };
            match wallet.kill(&address) {
                Ok(()) => writeln!(self.out, "Killed {}", address.hex())?,
                Err(e) => self.fail(e)?,
            }
        }
        Ok(())
    }
}
