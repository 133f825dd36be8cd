//! Session token storage
//!
//! `TokenStore` is the durable home of the current token pair. The refresh
//! coordinator reads the refresh token from it and writes the new pair back
//! after every successful refresh; nothing else persists tokens.
//!
//! Two implementations:
//! - `MemoryTokenStore` keeps the pair in process (tests, embedding)
//! - `FileTokenStore` keeps it in a JSON file written atomically with 0600
//!   permissions

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::token::SessionTokens;

/// Durable get/save of the current session tokens.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenStore>`).
pub trait TokenStore: Send + Sync {
    /// The stored pair, or `None` when no session is stored.
    fn get(&self) -> Pin<Box<dyn Future<Output = Result<Option<SessionTokens>>> + Send + '_>>;

    /// Replace the stored pair.
    fn save<'a>(
        &'a self,
        tokens: &'a SessionTokens,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// In-process token store.
#[derive(Default)]
pub struct MemoryTokenStore {
    state: Mutex<Option<SessionTokens>>,
    saves: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn new(tokens: Option<SessionTokens>) -> Self {
        Self {
            state: Mutex::new(tokens),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls since construction.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Forget the stored pair.
    pub async fn clear(&self) {
        *self.state.lock().await = None;
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Pin<Box<dyn Future<Output = Result<Option<SessionTokens>>> + Send + '_>> {
        Box::pin(async move { Ok(self.state.lock().await.clone()) })
    }

    fn save<'a>(
        &'a self,
        tokens: &'a SessionTokens,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            *self.state.lock().await = Some(tokens.clone());
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Token file manager.
///
/// The Mutex serializes all file access so a save racing a clear can never
/// leave a half-written file behind.
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Manage the token file at `path`. The file need not exist yet.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Remove the stored session. Missing files are not an error.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "cleared stored session");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing token file: {e}"))),
        }
    }

    async fn read(&self) -> Result<Option<SessionTokens>> {
        let _guard = self.lock.lock().await;
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored session");
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(format!("reading token file: {e}"))),
        };
        let tokens = serde_json::from_str(&contents)
            .map_err(|e| Error::TokenParse(format!("parsing token file: {e}")))?;
        Ok(Some(tokens))
    }

    async fn write(&self, tokens: &SessionTokens) -> Result<()> {
        let _guard = self.lock.lock().await;
        write_atomic(&self.path, tokens).await
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Pin<Box<dyn Future<Output = Result<Option<SessionTokens>>> + Send + '_>> {
        Box::pin(self.read())
    }

    fn save<'a>(
        &'a self,
        tokens: &'a SessionTokens,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.write(tokens))
    }
}

/// Write the token pair to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer credentials.
async fn write_atomic(path: &Path, tokens: &SessionTokens) -> Result<()> {
    let json = serde_json::to_string_pretty(tokens)
        .map_err(|e| Error::TokenParse(format!("serializing tokens: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;
    if !dir.as_os_str().is_empty() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io(format!("creating token directory: {e}")))?;
    }

    // Unique per write: stores sharing a directory must never share a temp file
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("token path has no file name".into()))?
        .to_string_lossy();
    let tmp_path = dir.join(format!(
        ".{file_name}.tmp.{}",
        uuid::Uuid::new_v4().simple()
    ));

    if let Err(e) = write_private(&tmp_path, json.as_bytes()).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Io(format!("renaming temp token file: {e}")));
    }

    debug!(path = %path.display(), "persisted session tokens");
    Ok(())
}

/// Write `contents` to `path` readable by the owner only.
async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    Ok(())
}
