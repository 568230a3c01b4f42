pub const SECRETS_DIR: &str = ".web3";
pub const SECRETS_SUBDIR: &str = "keys";
pub const WALLET_DIR: &str = ".ethereum";
pub const WALLET_FILE: &str = "keys.info";
pub const KEY_FILE_EXT: &str = "json";

pub const SECRETS_PATH_ENV: &str = "KEYMAN_SECRETS_PATH";
pub const WALLET_PATH_ENV: &str = "KEYMAN_WALLET_PATH";

pub const KEY_FILE_VERSION: u32 = 3;
pub const WALLET_VERSION: u32 = 1;
pub const CIPHER_NAME: &str = "aes-256-gcm";
pub const PBKDF2_PRF: &str = "hmac-sha256";

pub const DEFAULT_KDF: &str = "scrypt";
pub const SCRYPT_LOG_N: u8 = 14;
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 1;
pub const PBKDF2_ITERATIONS: u32 = 262_144;
pub const DERIVED_KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub const SECRET_LEN: usize = 32;
pub const ADDRESS_LEN: usize = 20;

pub const UNLOCK_ATTEMPTS: usize = 10;
pub const ICAP_ROUNDS: u32 = 65_536;

pub const MASTER_CREATE_PROMPT: &str = "Please enter a MASTER password to protect your key store (make it strong!): ";
pub const MASTER_PROMPT: &str = "Please enter your MASTER password: ";
pub const CONFIRM_PROMPT: &str = "Please confirm the password by entering it again: ";
pub const HINT_PROMPT: &str = "Enter a hint to help you remember this password: ";
pub const NEW_KEY_PROMPT: &str = "Enter a password with which to secure this account: ";
