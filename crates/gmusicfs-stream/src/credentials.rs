//! Credential store and login session.
//!
//! Credentials live in a per-user TOML file (`~/.gmusicfs` by default) that
//! must be private to its owner:
//!
//! ```toml
//! [credentials]
//! username = "me@example.com"
//! password = "app-password"
//! device_id = "0123456789abcdef"
//! ```
//!
//! A [`Session`] is built once at startup and handed to the catalog client.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// File name of the credential store inside the home directory
pub const CREDENTIALS_FILE: &str = ".gmusicfs";

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub device_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("device_id", &self.device_id)
            .finish()
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    credentials: Option<Credentials>,
}

impl Credentials {
    /// Default location of the credential store, `$HOME/.gmusicfs`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(CREDENTIALS_FILE))
    }

    /// Load and validate the credential store at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::CredentialsNotFound {
                path: path.to_path_buf(),
            });
        }
        check_private(path)?;

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CredentialsFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let missing = |field| ConfigError::MissingField {
            path: path.to_path_buf(),
            field,
        };
        let credentials = file.credentials.ok_or_else(|| missing("credentials"))?;
        if credentials.username.trim().is_empty() {
            return Err(missing("username"));
        }
        if credentials.password.is_empty() {
            return Err(missing("password"));
        }
        if credentials.device_id.trim().is_empty() {
            return Err(missing("device_id"));
        }

        tracing::debug!(path = %path.display(), username = %credentials.username, "loaded credentials");
        Ok(credentials)
    }
}

#[cfg(unix)]
fn check_private(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(ConfigError::InsecurePermissions {
            path: path.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_private(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

/// Login state shared with the catalog client.
///
/// Constructed once and passed explicitly; there is no global session.
#[derive(Debug, Clone)]
pub struct Session {
    credentials: Credentials,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Load the credential store at `path` and open a session with it
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Credentials::load(path).map(Self::new)
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub fn password(&self) -> &str {
        &self.credentials.password
    }

    pub fn device_id(&self) -> &str {
        &self.credentials.device_id
    }
}
