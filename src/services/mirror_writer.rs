//! src/services/mirror_writer.rs
//!
//! Makes sure a remote object's content exists at each of its local targets.
//!
//! - Targets are checked one by one; only the missing ones are written.
//! - Content is fetched at most once per call: streamed into a temp file next
//!   to the first missing target, renamed into place, then copied locally to
//!   the remaining missing targets.
//! - A failed transfer never leaves a file at a target path, so the existence
//!   check stays a reliable "already mirrored" signal.

use crate::{
    models::remote_object::RemoteObject,
    services::{
        key_mapper::MirrorTargets,
        remote_store::{RemoteError, RemoteStore},
    },
};
use futures::StreamExt;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: RemoteError,
    },
    #[error("writing {} failed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Every target already existed; nothing was fetched.
    AlreadyPresent,
    /// The listed targets were written.
    Mirrored { written: Vec<PathBuf> },
}

#[derive(Clone)]
pub struct MirrorWriter {
    store: Arc<dyn RemoteStore>,
}

impl MirrorWriter {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Write `object` to every target in `targets` that does not exist yet.
    pub async fn mirror(
        &self,
        object: &RemoteObject,
        targets: &MirrorTargets,
    ) -> Result<MirrorOutcome, MirrorError> {
        let mut missing = Vec::new();
        for path in targets.all() {
            let exists = fs::try_exists(path).await.map_err(|source| MirrorError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if !exists {
                missing.push(path.to_path_buf());
            }
        }

        let Some((first, rest)) = missing.split_first() else {
            debug!(public_id = %object.public_id, "already mirrored; skipping");
            return Ok(MirrorOutcome::AlreadyPresent);
        };

        let bytes = self.download(&object.url, first).await?;
        for path in rest {
            copy_local(first, path).await?;
        }

        info!(
            public_id = %object.public_id,
            bytes,
            targets = missing.len(),
            "mirrored object"
        );
        Ok(MirrorOutcome::Mirrored { written: missing })
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, MirrorError> {
        let tmp_path = prepare_tmp(dest).await?;
        match self.stream_into(url, &tmp_path).await {
            Ok(bytes) => {
                promote(&tmp_path, dest).await?;
                Ok(bytes)
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(err)
            }
        }
    }

    async fn stream_into(&self, url: &str, tmp_path: &Path) -> Result<u64, MirrorError> {
        let fetch_err = |source| MirrorError::Fetch {
            url: url.to_string(),
            source,
        };
        let io_err = |source| MirrorError::Io {
            path: tmp_path.to_path_buf(),
            source,
        };

        let mut stream = self.store.fetch(url).await.map_err(fetch_err)?;
        let mut file = File::create(tmp_path).await.map_err(io_err)?;

        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(fetch_err)?;
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        Ok(written)
    }
}

/// Create `dest`'s parent directories and return a fresh temp path beside it.
async fn prepare_tmp(dest: &Path) -> Result<PathBuf, MirrorError> {
    let parent = dest.parent().ok_or_else(|| MirrorError::Io {
        path: dest.to_path_buf(),
        source: io::Error::new(ErrorKind::InvalidInput, "target path has no parent directory"),
    })?;
    fs::create_dir_all(parent)
        .await
        .map_err(|source| MirrorError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    Ok(parent.join(format!(".tmp-{}", Uuid::new_v4())))
}

/// Move a completed temp file onto `dest`, replacing a file another sweep may
/// have written in the meantime.
async fn promote(tmp_path: &Path, dest: &Path) -> Result<(), MirrorError> {
    let io_err = |source| MirrorError::Io {
        path: dest.to_path_buf(),
        source,
    };
    if let Err(err) = fs::rename(tmp_path, dest).await {
        if err.kind() == ErrorKind::AlreadyExists {
            fs::remove_file(dest).await.map_err(io_err)?;
            if let Err(err) = fs::rename(tmp_path, dest).await {
                let _ = fs::remove_file(tmp_path).await;
                return Err(io_err(err));
            }
        } else {
            let _ = fs::remove_file(tmp_path).await;
            return Err(io_err(err));
        }
    }
    Ok(())
}

async fn copy_local(src: &Path, dest: &Path) -> Result<(), MirrorError> {
    let tmp_path = prepare_tmp(dest).await?;
    if let Err(source) = fs::copy(src, &tmp_path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(MirrorError::Io {
            path: dest.to_path_buf(),
            source,
        });
    }
    promote(&tmp_path, dest).await
}
