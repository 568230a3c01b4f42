//! Error types for the secret store, the wallet and the executor.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::types::Address;

/// Errors raised by the key collaborators (store, wallet, crypto, prompts).
#[derive(Debug, Error)]
pub enum KeyError {
    /// Filesystem or console failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A key file or wallet file could not be (de)serialized.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Key derivation could not run with the given parameters.
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// A `--kdf-param` was unknown or had an invalid value.
    #[error("invalid KDF parameter {name}={value}")]
    KdfParam { name: String, value: String },

    /// Symmetric cipher failure other than authentication.
    #[error("cipher error: {0}")]
    Cipher(String),

    /// Authentication failed: wrong password or corrupt ciphertext.
    #[error("decryption failed; key corrupt or incorrect password supplied")]
    Decrypt,

    /// The 32 bytes are not a valid secp256k1 scalar.
    #[error("invalid secret key")]
    InvalidSecret,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid ICAP: {0}")]
    InvalidIcap(String),

    /// The address has a non-zero leading byte and has no direct ICAP form.
    #[error("address {0} is not direct-ICAP capable")]
    NotIcapCapable(Address),

    #[error("gave up looking for an ICAP-capable key after {0} rounds")]
    IcapExhausted(u32),

    #[error("key {0} not found")]
    KeyNotFound(Uuid),

    #[error("account {0} not found in wallet")]
    AccountNotFound(Address),

    #[error("account {0} is already in the wallet")]
    AlreadyRegistered(Address),

    #[error("not a key file: {}", .0.display())]
    NotKeyFile(PathBuf),

    /// Wallet operation attempted before a successful `load`/`create`.
    #[error("wallet is locked")]
    Locked,

    #[error("Aborted (empty password not allowed).")]
    EmptyPassword,

    /// The password source could not produce a response.
    #[error("password prompt failed: {0}")]
    Prompt(String),
}

/// Outcomes of the executor that end the operation as a whole.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A wallet-family operation was requested but no wallet exists. Fatal.
    #[error("Couldn't open wallet. Does it exist?")]
    WalletMissing,

    #[error("wallet not unlocked after {0} attempts")]
    Unlock(usize),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("console error: {0}")]
    Console(#[from] io::Error),
}
