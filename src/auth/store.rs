use std::fs;
use std::path::{Path, PathBuf};

use super::error::AuthError;
use super::token::PrimaryCredential;

/// Storage abstraction for the persisted primary credential.
///
/// The file-backed store is the default; other secret backends plug in here.
pub trait CredentialStore: Send + Sync {
    /// Returns `None` when nothing usable is stored. Never fails for a
    /// missing, unreadable, or blank file.
    fn load(&self) -> Option<PrimaryCredential>;
    fn save(&self, credential: &PrimaryCredential) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

/// Plaintext token file readable and writable by the owner only.
///
/// # Example
/// ```no_run
/// use copilot_auth::auth::{CredentialStore, FileCredentialStore, PrimaryCredential};
///
/// let store = FileCredentialStore::new_default();
/// let credential = PrimaryCredential::new("ghu_example").unwrap();
/// store.save(&credential)?;
/// assert_eq!(store.load(), Some(credential));
/// # Ok::<(), copilot_auth::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn new_default() -> Self {
        Self::new(default_credential_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn write_restricted(&self, contents: &str) -> Result<(), AuthError> {
        self.ensure_parent()?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        {
            use std::io::Write;
            let mut file = options.open(&self.path)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        // An existing file keeps its old mode through open(); reset it.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<PrimaryCredential> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => PrimaryCredential::new(raw),
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %self.path.display(), error = %err, "credential file unreadable");
                }
                None
            }
        }
    }

    fn save(&self, credential: &PrimaryCredential) -> Result<(), AuthError> {
        self.write_restricted(credential.expose())?;
        tracing::debug!(path = %self.path.display(), "saved primary credential");
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        self.write_restricted("")?;
        tracing::debug!(path = %self.path.display(), "cleared primary credential");
        Ok(())
    }
}

/// `<platform data dir>/copilot-auth/github_token`, or a relative fallback
/// when no home directory can be resolved.
pub fn default_credential_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "copilot-auth")
        .map(|dirs| dirs.data_dir().join("github_token"))
        .unwrap_or_else(|| PathBuf::from(".copilot-auth").join("github_token"))
}
