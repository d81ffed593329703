//! Session credential loading.
//!
//! The credential file is re-read on every [`CredentialStore::load`] so an
//! operator can paste a fresh session token while the loop is running.
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file {0} does not exist")]
    Missing(PathBuf),
    #[error("credential file {0} is empty")]
    Empty(PathBuf),
    #[error("credential file {path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Opaque session token. Debug output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the token from disk, trimming surrounding whitespace.
    pub fn load(&self) -> Result<Credential, CredentialError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CredentialError::Missing(self.path.clone()));
            }
            Err(source) => {
                return Err(CredentialError::Unreadable {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let text = String::from_utf8(bytes).map_err(|err| CredentialError::Unreadable {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        })?;
        let token = text.trim();
        if token.is_empty() {
            return Err(CredentialError::Empty(self.path.clone()));
        }
        Ok(Credential::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = CredentialStore::new(dir.path().join("session.txt"));
        assert!(matches!(store.load(), Err(CredentialError::Missing(_))));
    }

    #[test]
    fn reports_blank_file_as_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("session.txt");
        fs::write(&path, "  \n\t\n").expect("write credential");
        let store = CredentialStore::new(path);
        assert!(matches!(store.load(), Err(CredentialError::Empty(_))));
    }

    #[test]
    fn reports_non_utf8_as_unreadable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("session.txt");
        fs::write(&path, [0xff, 0xfe, 0x00]).expect("write credential");
        let store = CredentialStore::new(path);
        assert!(matches!(
            store.load(),
            Err(CredentialError::Unreadable { .. })
        ));
    }

    #[test]
    fn observes_updates_without_restart() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("session.txt");
        fs::write(&path, "old-token\n").expect("write credential");
        let store = CredentialStore::new(path.clone());
        assert_eq!(store.load().expect("load").token(), "old-token");

        fs::write(&path, "fresh-token").expect("rewrite credential");
        assert_eq!(store.load().expect("reload").token(), "fresh-token");
    }

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", Credential::new("secret-value"));
        assert!(!rendered.contains("secret-value"));
    }
}
