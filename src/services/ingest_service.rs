//! src/services/ingest_service.rs
//!
//! IngestService — takes one staged image plus its metadata, uploads it to
//! the remote store under `root/zone/supervisor/ward/date/category/<stem>`,
//! and runs the configured post-upload action.
//!
//! The staged temp file is always removed once the remote call has
//! returned, whatever its outcome. Validation failures never reach the
//! remote store.

use crate::{
    config::PostUploadAction,
    models::{
        remote_object::RemoteObject,
        upload::{FieldError, UploadFields},
    },
    services::{
        key_mapper::KeyMapper,
        mirror_writer::MirrorOutcome,
        remote_store::{RemoteError, RemoteStore},
        scheduler::RunTrigger,
        sweeper::Sweeper,
    },
};
use axum::http::StatusCode;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Field(#[from] FieldError),
    /// The multipart body could not be read; `status` is what the client should see.
    #[error("malformed multipart form: {message}")]
    Form { status: StatusCode, message: String },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// An uploaded file parked on local disk until it is sent on.
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: Option<String>,
    pub size_bytes: u64,
}

impl StagedFile {
    /// Delete the temp file; failures are logged, not returned.
    pub async fn discard(self) {
        match fs::remove_file(&self.path).await {
            Ok(_) => debug!("removed staged upload {}", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove staged upload"
            ),
        }
    }
}

/// Result of a successful ingest.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub object: RemoteObject,
    /// Set when the object was mirrored locally before responding.
    pub mirrored: bool,
}

#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn RemoteStore>,
    sweeper: Sweeper,
    upload_dir: PathBuf,
    timestamp_suffix: bool,
    post_upload: PostUploadAction,
    sweep_trigger: Option<RunTrigger>,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        mapper: KeyMapper,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sweeper: Sweeper::new(store.clone(), mapper),
            store,
            upload_dir: upload_dir.into(),
            timestamp_suffix: true,
            post_upload: PostUploadAction::None,
            sweep_trigger: None,
        }
    }

    /// Append `-<unix millis>` to every key's final segment.
    pub fn with_timestamp_suffix(mut self, enabled: bool) -> Self {
        self.timestamp_suffix = enabled;
        self
    }

    /// Mirror each new object in-process before responding.
    pub fn mirror_after_upload(mut self) -> Self {
        self.post_upload = PostUploadAction::Mirror;
        self
    }

    /// Request a background sweep through `trigger` after each upload.
    pub fn sweep_after_upload(mut self, trigger: RunTrigger) -> Self {
        self.post_upload = PostUploadAction::Sweep;
        self.sweep_trigger = Some(trigger);
        self
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn mirror_dir(&self) -> &Path {
        self.sweeper.mapper().base_dir()
    }

    /// Stream an incoming file part into a fresh temp file under `upload_dir`.
    ///
    /// The partial file is removed if the stream or the disk fails midway.
    pub async fn stage<S, E>(
        &self,
        original_name: Option<String>,
        stream: S,
    ) -> IngestResult<StagedFile>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<IngestError>,
    {
        fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_dir.join(Uuid::new_v4().to_string());
        let mut file = File::create(&path).await?;

        let mut size_bytes: u64 = 0;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&path).await;
                    return Err(err.into());
                }
            };
            size_bytes += chunk.len() as u64;
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&path).await;
                return Err(IngestError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&path).await;
            return Err(IngestError::Io(err));
        }

        debug!(path = %path.display(), size_bytes, "staged upload");
        Ok(StagedFile {
            path,
            original_name,
            size_bytes,
        })
    }

    /// Validate, upload and clean up.
    ///
    /// A missing field or file fails with `IngestError::Field` before any
    /// remote call is made; the staged file (if any) is discarded either way.
    pub async fn ingest(
        &self,
        fields: UploadFields,
        staged: Option<StagedFile>,
    ) -> IngestResult<IngestReceipt> {
        let (fields, staged) = match (fields.validate(), staged) {
            (Ok(fields), Some(staged)) => (fields, staged),
            (result, staged) => {
                if let Some(staged) = staged {
                    staged.discard().await;
                }
                return Err(result.err().unwrap_or(FieldError::Missing("image")).into());
            }
        };

        let mut stem = fields.file_stem(staged.original_name.as_deref());
        if self.timestamp_suffix {
            stem = format!("{}-{}", stem, Utc::now().timestamp_millis());
        }
        let public_id = self.sweeper.mapper().build_key(&fields, &stem);

        info!(public_id = %public_id, size_bytes = staged.size_bytes, "uploading image");
        let uploaded = self.store.upload(&staged.path, &public_id).await;
        staged.discard().await;
        let object = uploaded?;

        let mirrored = self.after_upload(&object).await;
        Ok(IngestReceipt { object, mirrored })
    }

    async fn after_upload(&self, object: &RemoteObject) -> bool {
        match self.post_upload {
            PostUploadAction::None => false,
            PostUploadAction::Mirror => match self.sweeper.mirror_one(object).await {
                Ok(Some(MirrorOutcome::Mirrored { .. } | MirrorOutcome::AlreadyPresent)) => true,
                Ok(None) => false,
                Err(err) => {
                    warn!(public_id = %object.public_id, error = %err, "immediate mirror failed; next sweep will retry");
                    false
                }
            },
            PostUploadAction::Sweep => {
                if let Some(trigger) = &self.sweep_trigger {
                    trigger.request();
                    debug!(public_id = %object.public_id, "sweep requested");
                }
                false
            }
        }
    }
}
