use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PublishError;
use crate::types::TOKEN_FILE_NAME;

/// Bearer token for the registry API.
///
/// Loaded once at startup and never mutated. `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` when the token is blank.
    pub fn new(token: impl AsRef<str>) -> Option<Self> {
        let token = token.as_ref().trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// `.token` in the directory that holds the running executable.
pub fn default_token_path() -> Result<PathBuf, PublishError> {
    let exe = env::current_exe().map_err(PublishError::CredentialLocation)?;
    Ok(token_path_for(&exe))
}

fn token_path_for(exe: &Path) -> PathBuf {
    exe.parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
        .join(TOKEN_FILE_NAME)
}

/// Read the token file. A missing or blank file is a fatal configuration error.
pub fn load_credential(path: &Path) -> Result<Credential, PublishError> {
    if !path.is_file() {
        return Err(PublishError::MissingCredential {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path).map_err(|source| PublishError::CredentialRead {
        path: path.to_path_buf(),
        source,
    })?;

    Credential::new(content).ok_or_else(|| PublishError::EmptyCredential {
        path: path.to_path_buf(),
    })
}
