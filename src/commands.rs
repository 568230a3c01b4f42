//! Turns the command-line token stream into a [`Session`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::constants::DEFAULT_KDF;
use crate::crypto::{Kdf, KdfConfig};
use crate::error::KeyError;
use crate::utils::{default_secrets_path, default_wallet_path};

/// The one operation an invocation performs. Bare modes come first; the
/// ordering is what separates the two families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum OperationMode {
    #[default]
    None,
    ListBare,
    NewBare,
    ImportBare,
    ExportBare,
    RecodeBare,
    CreateWallet,
    List,
    New,
    Import,
    Export,
    Recode,
    Kill,
}

impl OperationMode {
    pub const FIRST_WALLET: Self = Self::CreateWallet;

    pub fn is_bare(self) -> bool {
        self < Self::FIRST_WALLET
    }

    /// Modes that take trailing positional inputs.
    pub fn collects_inputs(self) -> bool {
        matches!(self, Self::ImportBare | Self::Recode | Self::Export | Self::RecodeBare | Self::ExportBare)
    }
}

/// Paths used when no flag overrides them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub wallet_path: PathBuf,
    pub secrets_path: PathBuf,
}

impl Defaults {
    pub fn from_env() -> Self {
        Self { wallet_path: default_wallet_path(), secrets_path: default_secrets_path() }
    }
}

/// Fully resolved invocation. Built once by [`Resolver::finish`].
#[derive(Clone)]
pub struct Session {
    pub mode: OperationMode,
    pub wallet_path: PathBuf,
    pub secrets_path: PathBuf,
    /// Empty means prompt when needed.
    pub master_password: Zeroizing<String>,
    pub unlocks: Vec<Zeroizing<String>>,
    pub lock: Zeroizing<String>,
    pub icap: bool,
    pub name: String,
    pub inputs: Vec<String>,
    pub kdf: String,
    pub kdf_params: BTreeMap<String, String>,
}

impl Session {
    pub fn new(defaults: Defaults) -> Self {
        Self {
            mode: OperationMode::None,
            wallet_path: defaults.wallet_path,
            secrets_path: defaults.secrets_path,
            master_password: Zeroizing::default(),
            unlocks: Vec::new(),
            lock: Zeroizing::default(),
            icap: true,
            name: String::new(),
            inputs: Vec::new(),
            kdf: DEFAULT_KDF.to_string(),
            kdf_params: BTreeMap::new(),
        }
    }

    pub fn kdf(&self) -> Kdf {
        Kdf::from_name(&self.kdf)
    }

    pub fn kdf_config(&self) -> Result<KdfConfig, KeyError> {
        KdfConfig::from_params(self.kdf(), &self.kdf_params)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("wallet_path", &self.wallet_path)
            .field("secrets_path", &self.secrets_path)
            .field("master_password", &(!self.master_password.is_empty()).then_some("[REDACTED]"))
            .field("unlocks", &self.unlocks.len())
            .field("lock", &(!self.lock.is_empty()).then_some("[REDACTED]"))
            .field("icap", &self.icap)
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("kdf", &self.kdf)
            .field("kdf_params", &self.kdf_params)
            .finish()
    }
}

/// What the resolver did with one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recognition {
    Flag,
    /// Consumed as the argument of the preceding flag.
    Argument,
    Input,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    WalletPath,
    SecretsPath,
    Master,
    Unlock,
    Lock,
    Kdf,
    KdfParamName,
    KdfParamValue(String),
    Name,
    ImportSource,
    Kill,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Ready,
    Awaiting(Slot),
}

pub struct Resolver {
    session: Session,
    state: State,
}

impl Resolver {
    pub fn new(defaults: Defaults) -> Self {
        Self { session: Session::new(defaults), state: State::Ready }
    }

    /// Folds the whole token list. Returns the session and the tokens nothing claimed.
    pub fn resolve<S: AsRef<str>>(tokens: &[S], defaults: Defaults) -> (Session, Vec<String>) {
        let mut resolver = Self::new(defaults);
        let mut unrecognized = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if resolver.feed(token.as_ref(), &tokens[i + 1..]) == Recognition::Unrecognized {
                unrecognized.push(token.as_ref().to_string());
            }
        }
        (resolver.finish(), unrecognized)
    }

    /// Consumes one token. `rest` is everything after it; a flag only
    /// commits when all of its arguments are present there.
    pub fn feed<S: AsRef<str>>(&mut self, token: &str, rest: &[S]) -> Recognition {
        if let State::Awaiting(slot) = std::mem::replace(&mut self.state, State::Ready) {
            self.fill(slot, token);
            return Recognition::Argument;
        }

        let session = &mut self.session;
        let has = |k: usize| rest.len() >= k;
        let next_is_value = rest.first().is_some_and(|t| !t.as_ref().starts_with('-'));
        let (mode, awaiting) = match token {
            "-n" | "--new" if next_is_value => (Some(OperationMode::New), Some(Slot::Name)),
            "-n" | "--new" => (Some(OperationMode::NewBare), None),
            "--wallet-path" if has(1) => (None, Some(Slot::WalletPath)),
            "--secrets-path" if has(1) => (None, Some(Slot::SecretsPath)),
            "-m" | "--master" if has(1) => (None, Some(Slot::Master)),
            "--unlock" if has(1) => (None, Some(Slot::Unlock)),
            "--lock" if has(1) => (None, Some(Slot::Lock)),
            "--kdf" if has(1) => (None, Some(Slot::Kdf)),
            "--kdf-param" if has(2) => (None, Some(Slot::KdfParamName)),
            "--new-bare" => (Some(OperationMode::NewBare), None),
            "--import-bare" => (Some(OperationMode::ImportBare), None),
            "--list-bare" => (Some(OperationMode::ListBare), None),
            "--export-bare" => (Some(OperationMode::ExportBare), None),
            "--recode-bare" => (Some(OperationMode::RecodeBare), None),
            "--create-wallet" => (Some(OperationMode::CreateWallet), None),
            "--list" => (Some(OperationMode::List), None),
            "-i" | "--import" if has(2) => (Some(OperationMode::Import), Some(Slot::ImportSource)),
            "--export" => (Some(OperationMode::Export), None),
            "--recode" => (Some(OperationMode::Recode), None),
            "--kill" if has(1) => (Some(OperationMode::Kill), Some(Slot::Kill)),
            "--no-icap" => {
                session.icap = false;
                (None, None)
            }
            _ if session.mode.collects_inputs() => {
                session.inputs.push(token.to_string());
                return Recognition::Input;
            }
            _ => return Recognition::Unrecognized,
        };

        if let Some(mode) = mode {
            session.mode = mode;
        }
        if let Some(slot) = awaiting {
            self.state = State::Awaiting(slot);
        }
        Recognition::Flag
    }

    fn fill(&mut self, slot: Slot, value: &str) {
        let session = &mut self.session;
        match slot {
            Slot::WalletPath => session.wallet_path = PathBuf::from(value),
            Slot::SecretsPath => session.secrets_path = PathBuf::from(value),
            Slot::Master => session.master_password = Zeroizing::new(value.to_string()),
            Slot::Unlock => session.unlocks.push(Zeroizing::new(value.to_string())),
            Slot::Lock => session.lock = Zeroizing::new(value.to_string()),
            Slot::Kdf => session.kdf = value.to_string(),
            Slot::KdfParamName => self.state = State::Awaiting(Slot::KdfParamValue(value.to_string())),
            Slot::KdfParamValue(name) => {
                session.kdf_params.insert(name, value.to_string());
            }
            Slot::Name => session.name = value.to_string(),
            Slot::ImportSource => {
                session.inputs = vec![value.to_string()];
                self.state = State::Awaiting(Slot::Name);
            }
            Slot::Kill => session.inputs.push(value.to_string()),
        }
    }

    pub fn finish(self) -> Session {
        self.session
    }
}

pub const HELP: &str = "\
Secret-store (\"bare\") operation modes:
    --list-bare  List all secrets available in the secret-store.
    --new-bare  Generate a key and store it without touching the wallet.
    -n,--new  Same as --new-bare when no name follows.
    --import-bare [ <file>|<secret-hex> , ... ]  Import keys from the given sources.
    --recode-bare [ <uuid> , ... ]  Decrypt and re-encrypt the given keys.
    --export-bare  Reserved; does nothing yet.
Secret-store configuration:
    --secrets-path <path>  Secret-store path (default: ~/.web3/keys, or $KEYMAN_SECRETS_PATH).

Wallet operating modes:
    --list  List all keys available in the wallet.
    -n,--new <name>  Create a new key with the given name and add it to the wallet.
    -i,--import <uuid>|<file>|<secret-hex> <name>  Import a key and place it in the wallet.
    --export [ <address>|<uuid> , ... ]  Export the given keys.
    --recode [ <address>|<uuid> , ... ]  Decrypt and re-encrypt the given keys.
    --kill <address>|<uuid>  Remove a key from the wallet and the secret-store.
Wallet configuration:
    --create-wallet  Create the master wallet.
    --wallet-path <path>  Wallet path (default: ~/.ethereum/keys.info, or $KEYMAN_WALLET_PATH).
    -m,--master <password>  Wallet (master) password.

Encryption configuration:
    --kdf <kdfname>  KDF to use when encrypting: scrypt or pbkdf2 (default: scrypt).
    --kdf-param <name> <value>  A parameter for the KDF (scrypt: n, r, p; pbkdf2: c).
    --lock <password>  Password used when encrypting a key.

Decryption configuration:
    --unlock <password>  Password for an existing key; may be repeated.
Key generation configuration:
    --no-icap  Don't bother to make a direct-ICAP capable key.";

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn defaults() -> Defaults {
        Defaults { wallet_path: PathBuf::from("/w/keys.info"), secrets_path: PathBuf::from("/s/keys") }
    }

    fn resolve(tokens: &[&str]) -> (Session, Vec<String>) {
        Resolver::resolve(tokens, defaults())
    }

    #[test]
    fn families_split_on_ordinal() {
        use OperationMode::*;
        for mode in [None, ListBare, NewBare, ImportBare, ExportBare, RecodeBare] {
            assert!(mode.is_bare(), "{mode:?}");
        }
        for mode in [CreateWallet, List, New, Import, Export, Recode, Kill] {
            assert!(!mode.is_bare(), "{mode:?}");
        }
    }

    #[test]
    fn empty_invocation_uses_defaults() {
        let (session, unknown) = resolve(&[]);
        assert_eq!(session.mode, OperationMode::None);
        assert_eq!(session.wallet_path, PathBuf::from("/w/keys.info"));
        assert!(session.icap);
        assert_eq!(session.kdf, "scrypt");
        assert!(unknown.is_empty());
    }

    #[test]
    fn new_with_name_is_a_wallet_operation() {
        let (session, _) = resolve(&["-n", "savings"]);
        assert_eq!(session.mode, OperationMode::New);
        assert_eq!(session.name, "savings");

        let (session, _) = resolve(&["--new", "--lock", "pw"]);
        assert_eq!(session.mode, OperationMode::NewBare);
        assert_eq!(&*session.lock, "pw");

        let (session, _) = resolve(&["-n"]);
        assert_eq!(session.mode, OperationMode::NewBare);
    }

    #[test]
    fn path_and_credential_flags() {
        let (session, unknown) = resolve(&[
            "--wallet-path", "/tmp/w", "--secrets-path", "/tmp/s", "-m", "master", "--unlock", "a", "--unlock", "b", "--no-icap", "--list",
        ]);
        assert!(unknown.is_empty());
        assert_eq!(session.mode, OperationMode::List);
        assert_eq!(session.wallet_path, PathBuf::from("/tmp/w"));
        assert_eq!(session.secrets_path, PathBuf::from("/tmp/s"));
        assert_eq!(&*session.master_password, "master");
        assert_eq!(session.unlocks.iter().map(|u| u.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert!(!session.icap);
    }

    #[test]
    fn kdf_selection_and_params() {
        let (session, _) = resolve(&["--kdf", "pbkdf2", "--kdf-param", "c", "1000"]);
        assert_eq!(session.kdf(), Kdf::Pbkdf2Sha256);
        assert_eq!(session.kdf_params.get("c").map(String::as_str), Some("1000"));
        assert_eq!(session.kdf_config().unwrap().iterations, 1000);

        let (session, _) = resolve(&["--kdf", "argon2"]);
        assert_eq!(session.kdf(), Kdf::Scrypt);

        let (session, _) = resolve(&["--kdf-param", "n", "1000"]);
        assert!(matches!(session.kdf_config(), Err(KeyError::KdfParam { .. })));
    }

    #[test]
    fn short_flags_fall_through() {
        let (session, unknown) = resolve(&["--kdf-param", "n"]);
        assert!(session.kdf_params.is_empty());
        assert_eq!(unknown, ["--kdf-param", "n"]);

        let (session, unknown) = resolve(&["--recode-bare", "--lock"]);
        assert_eq!(session.mode, OperationMode::RecodeBare);
        assert_eq!(session.inputs, ["--lock"]);
        assert!(unknown.is_empty());

        let (session, unknown) = resolve(&["-i", "only-source"]);
        assert_eq!(session.mode, OperationMode::None);
        assert_eq!(unknown, ["-i", "only-source"]);
    }

    #[test]
    fn import_captures_one_source_and_a_name() {
        let (session, _) = resolve(&["--recode", "x", "-i", "key.json", "mine"]);
        assert_eq!(session.mode, OperationMode::Import);
        assert_eq!(session.inputs, ["key.json"]);
        assert_eq!(session.name, "mine");
    }

    #[test]
    fn collecting_modes_gather_inputs() {
        let (session, unknown) = resolve(&["--import-bare", "a", "b", "--lock", "pw", "c"]);
        assert_eq!(session.inputs, ["a", "b", "c"]);
        assert_eq!(&*session.lock, "pw");
        assert!(unknown.is_empty());

        let (session, unknown) = resolve(&["--list-bare", "stray"]);
        assert!(session.inputs.is_empty());
        assert_eq!(unknown, ["stray"]);
    }

    #[test]
    fn kill_takes_its_target() {
        let (session, _) = resolve(&["--kill", "0x00c5496aee77c1ba1f0854206a26dda82a81d6d8"]);
        assert_eq!(session.mode, OperationMode::Kill);
        assert_eq!(session.inputs, ["0x00c5496aee77c1ba1f0854206a26dda82a81d6d8"]);
    }

    #[test]
    fn debug_redacts_passwords() {
        let (session, _) = resolve(&["-m", "hunter2", "--lock", "swordfish"]);
        let shown = format!("{session:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("swordfish"));
    }

    fn mode_flag() -> impl Strategy<Value = (&'static str, OperationMode)> {
        prop::sample::select(vec![
            ("--new-bare", OperationMode::NewBare),
            ("--import-bare", OperationMode::ImportBare),
            ("--list-bare", OperationMode::ListBare),
            ("--export-bare", OperationMode::ExportBare),
            ("--recode-bare", OperationMode::RecodeBare),
            ("--create-wallet", OperationMode::CreateWallet),
            ("--list", OperationMode::List),
            ("--export", OperationMode::Export),
            ("--recode", OperationMode::Recode),
            ("-n", OperationMode::NewBare),
        ])
    }

    proptest! {
        #[test]
        fn last_mode_flag_wins(
            steps in prop::collection::vec((mode_flag(), prop::option::of("[a-z0-9]{1,8}")), 1..12),
        ) {
            let mut tokens = Vec::new();
            for ((flag, _), unlock) in &steps {
                tokens.push(flag.to_string());
                if let Some(unlock) = unlock {
                    tokens.push("--unlock".to_string());
                    tokens.push(unlock.clone());
                }
            }
            let (session, _) = Resolver::resolve(&tokens, defaults());
            let expected = steps.last().map(|((_, mode), _)| *mode).unwrap_or_default();
            prop_assert_eq!(session.mode, expected);
        }

        #[test]
        fn plain_words_without_a_mode_are_unrecognized(tokens in prop::collection::vec("[a-z]{1,6}", 0..16)) {
            let (session, unknown) = Resolver::resolve(&tokens, defaults());
            prop_assert_eq!(session.mode, OperationMode::None);
            prop_assert!(session.inputs.is_empty());
            prop_assert_eq!(unknown, tokens);
        }
    }
}
