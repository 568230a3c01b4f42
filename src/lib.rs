//! # keyman
//!
//! Offline command-line manager for account keys.
//!
//! Keys live in two layers. The **secret store** ("bare" mode) is a directory of
//! encrypted key files, one per key, each addressed by a UUID. The **wallet** sits
//! on top of the same store, is sealed with a single master password, and gives
//! every key a human-readable name plus an optional password hint.
//!
//! ## Usage
//!
//! ```bash
//! # Using cargo
//! cargo run -- <flags> [inputs]
//!
//! # Using the compiled binary
//! ./target/release/keyman <flags> [inputs]
//! ```
//!
//! Exactly one operation runs per invocation. When several operation flags are
//! given, the last one wins.
//!
//! ### Secret Store
//!
//! ```bash
//! keyman --list-bare
//! keyman --new-bare --lock "p@ssw0rd"
//! keyman --import-bare 4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318 ./secret.txt ./key.json
//! keyman --recode-bare 1b4e28ba-2fa1-11d2-883f-0016d3cca427 --unlock "old" --lock "new"
//! ```
//!
//! **Inputs** to `--import-bare` are tried in this order:
//! - 64 hex digits (optionally `0x`-prefixed): the raw secret
//! - a file whose contents are 64 hex digits
//! - a key file previously written by `keyman`
//!
//! One bad input is reported on stderr and the rest of the batch still runs.
//!
//! ### Wallet
//!
//! ```bash
//! keyman --create-wallet
//! keyman -n savings
//! keyman -i ./key.json imported
//! keyman --list
//! keyman --export 0x00c5496aee77c1ba1f0854206a26dda82a81d6d8 > backup.json
//! keyman --recode 1b4e28ba-2fa1-11d2-883f-0016d3cca427 --kdf pbkdf2
//! keyman --kill 0x00c5496aee77c1ba1f0854206a26dda82a81d6d8
//! ```
//!
//! Every wallet operation first asks for the master password (or takes `-m`)
//! and gives up after ten wrong answers. A missing wallet ends the process with
//! a non-zero status.
//!
//! **Flags:**
//! - `--wallet-path <path>` / `--secrets-path <path>`: override the default locations
//!   (`~/.ethereum/keys.info` and `~/.web3/keys`, or `$KEYMAN_WALLET_PATH` / `$KEYMAN_SECRETS_PATH`)
//! - `--lock <password>`: password for newly encrypted keys (otherwise prompted twice)
//! - `--unlock <password>`: candidate password for existing keys, repeatable
//! - `--kdf <scrypt|pbkdf2>` and `--kdf-param <name> <value>`: key derivation for new ciphertexts
//! - `--no-icap`: skip the search for a key whose address has a direct ICAP form
//! - `-v`: more log output on stderr (`-vv` for debug); `RUST_LOG` overrides
//!
//! ## ICAP
//!
//! New keys are, by default, searched until the address starts with a zero byte.
//! Such an address has a direct ICAP form (`XE` + two check digits + 30 base-36
//! digits) which is printed next to the hex address.

pub mod commands;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod icap;
pub mod ops;
pub mod prompt;
pub mod store;
pub mod types;
pub mod utils;
pub mod wallet;
