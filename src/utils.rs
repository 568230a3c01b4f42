use std::{env, fs, path::{Path, PathBuf}};

use crate::constants::*;
use crate::error::KeyError;

pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Secret-store directory: `$KEYMAN_SECRETS_PATH`, else `~/.web3/keys`.
pub fn default_secrets_path() -> PathBuf {
    match env::var(SECRETS_PATH_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => home_dir().join(SECRETS_DIR).join(SECRETS_SUBDIR),
    }
}

/// Wallet file: `$KEYMAN_WALLET_PATH`, else `~/.ethereum/keys.info`.
pub fn default_wallet_path() -> PathBuf {
    match env::var(WALLET_PATH_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => home_dir().join(WALLET_DIR).join(WALLET_FILE),
    }
}

pub fn ensure_secure_dir(dir: &Path) -> Result<(), KeyError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        set_secure_permissions(dir)?;
    }
    Ok(())
}

/// Writes `contents` and restricts the file to its owner.
pub fn write_secure_file(path: &Path, contents: &str) -> Result<(), KeyError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_secure_dir(parent)?;
    }
    fs::write(path, contents)?;
    set_secure_file_permissions(path)
}

pub fn set_secure_permissions(path: &Path) -> Result<(), KeyError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    #[cfg(windows)]
    {
        tracing::warn!(path = %path.display(), "directory permissions not set on Windows");
    }
    Ok(())
}

pub fn set_secure_file_permissions(path: &Path) -> Result<(), KeyError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(windows)]
    {
        tracing::warn!(path = %path.display(), "file permissions not set on Windows");
    }
    Ok(())
}
