use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::constants::SESSION_USER_KEY;
use crate::models::SessionUser;

/// Client-side session holder: the current user plus a loading flag,
/// persisted as a JSON object under the `"user"` key of a local file.
pub struct SessionStore {
    path: PathBuf,
    user: Option<SessionUser>,
    loading: bool,
}

impl SessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            user: None,
            loading: true,
        }
    }

    /// Reads the persisted user, if any. A missing file means no session.
    pub async fn load(&mut self) -> Result<Option<SessionUser>> {
        self.loading = true;
        let result = self.read_file().await;
        self.loading = false;
        self.user = result?;
        Ok(self.user.clone())
    }

    async fn read_file(&self) -> Result<Option<SessionUser>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read session file {}", self.path.display()));
            }
        };

        let document: Map<String, Value> =
            serde_json::from_str(&raw).context("session file is not a JSON object")?;
        match document.get(SESSION_USER_KEY) {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(
                serde_json::from_value(value.clone()).context("invalid stored user record")?,
            )),
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Persists `Some(user)` or clears the stored session on `None`.
    pub async fn update_user(&mut self, user: Option<SessionUser>) -> Result<()> {
        match &user {
            Some(user) => {
                let mut document = Map::new();
                document.insert(SESSION_USER_KEY.to_string(), serde_json::to_value(user)?);
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&self.path, serde_json::to_vec_pretty(&document)?)
                    .await
                    .with_context(|| {
                        format!("failed to write session file {}", self.path.display())
                    })?;
            }
            None => match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        self.user = user;
        self.loading = false;
        Ok(())
    }
}
