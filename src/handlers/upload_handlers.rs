//! `POST /upload` — multipart image ingest.
//! The file part is streamed to a temp file rather than buffered; storage and
//! remote concerns are delegated to `IngestService`.

use crate::{
    errors::AppError,
    models::upload::{FILE_FIELD, UploadFields},
    services::ingest_service::{IngestError, IngestService, StagedFile},
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub url: String,
    pub public_id: String,
}

/// Accept one `image` part plus `zone`, `supervisor`, `ward`, `date`,
/// `category` and an optional `filename`.
pub async fn upload_image(
    State(service): State<IngestService>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut fields = UploadFields::default();
    let mut staged: Option<StagedFile> = None;

    if let Err(err) = read_form(&service, &mut multipart, &mut fields, &mut staged).await {
        if let Some(staged) = staged {
            staged.discard().await;
        }
        return Err(err.into());
    }

    let receipt = service.ingest(fields, staged).await.map_err(|err| {
        if !matches!(err, IngestError::Field(_)) {
            error!(error = %err, "upload failed");
        }
        AppError::from(err)
    })?;

    let message = if receipt.mirrored {
        "Uploaded to cloud and mirrored locally"
    } else {
        "Uploaded to cloud"
    };
    Ok(Json(UploadResponse {
        message,
        url: receipt.object.url,
        public_id: receipt.object.public_id,
    }))
}

async fn read_form(
    service: &IngestService,
    multipart: &mut Multipart,
    fields: &mut UploadFields,
    staged: &mut Option<StagedFile>,
) -> Result<(), IngestError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == FILE_FIELD {
            if staged.is_some() {
                debug!("ignoring extra `{}` part", FILE_FIELD);
                continue;
            }
            let original_name = field.file_name().map(str::to_string);
            *staged = Some(service.stage(original_name, field).await?);
        } else {
            let value = field.text().await?;
            if !fields.set(&name, value) {
                debug!(field = %name, "ignoring unknown form field");
            }
        }
    }
    Ok(())
}

impl From<MultipartError> for IngestError {
    fn from(err: MultipartError) -> Self {
        IngestError::Form {
            status: err.status(),
            message: err.body_text(),
        }
    }
}
