//! `RemoteStore` backed by the Cloudinary upload and search APIs.
//!
//! - upload: signed multipart `POST /v1_1/{cloud}/image/upload`
//! - search: basic-auth JSON `POST /v1_1/{cloud}/resources/search`
//! - fetch:  plain `GET` of the object's `secure_url`
//!
//! Every request carries the configured timeout, which covers the response
//! body as well as the connect/headers phase.

use crate::{
    config::RemoteConfig,
    models::remote_object::RemoteObject,
    services::remote_store::{ByteStream, RemoteError, RemoteStore, SearchPage},
};
use async_trait::async_trait;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use reqwest::{
    Body, Client, Response,
    multipart::{Form, Part},
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::{fmt, path::Path};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

#[derive(Clone)]
pub struct CloudinaryClient {
    http: Client,
    config: RemoteConfig,
}

impl fmt::Debug for CloudinaryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryClient")
            .field("cloud_name", &self.config.cloud_name)
            .field("api_base", &self.config.api_base)
            .finish_non_exhaustive()
    }
}

impl CloudinaryClient {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .user_agent(concat!("zone-mirror/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/v1_1/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            path
        )
    }

    fn classify(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.config.timeout)
        } else {
            RemoteError::Http(err)
        }
    }
}

#[async_trait]
impl RemoteStore for CloudinaryClient {
    async fn upload(&self, local_path: &Path, public_id: &str) -> Result<RemoteObject, RemoteError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(
            &[("public_id", public_id), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );

        let file = File::open(local_path).await?;
        let length = file.metadata().await?.len();
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(file_name);

        let form = Form::new()
            .text("public_id", public_id.to_string())
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature)
            .part("file", part);

        debug!(public_id, bytes = length, "uploading to cloudinary");
        let response = self
            .http
            .post(self.endpoint("image/upload"))
            .timeout(self.config.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let object: RemoteObject = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        info!(public_id = %object.public_id, url = %object.url, "uploaded to cloudinary");
        Ok(object)
    }

    async fn search(
        &self,
        prefix: &str,
        max_results: usize,
        cursor: Option<&str>,
    ) -> Result<SearchPage, RemoteError> {
        let mut body = json!({
            "expression": format!("folder:{prefix}/*"),
            "max_results": max_results,
            "sort_by": [{ "public_id": "asc" }],
        });
        if let Some(cursor) = cursor {
            body["next_cursor"] = json!(cursor);
        }

        let response = self
            .http
            .post(self.endpoint("resources/search"))
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        ensure_success(response)
            .await?
            .json::<SearchPage>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn fetch(&self, url: &str) -> Result<ByteStream, RemoteError> {
        let response = self
            .http
            .get(url)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let response = ensure_success(response).await?;

        let timeout = self.config.timeout;
        Ok(response
            .bytes_stream()
            .map_err(move |err| {
                if err.is_timeout() {
                    RemoteError::Timeout(timeout)
                } else {
                    RemoteError::Http(err)
                }
            })
            .boxed())
    }
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Parameters joined as `k=v&k=v` in key order, the form Cloudinary signs.
fn string_to_sign(params: &[(&str, &str)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex SHA-256 of the string-to-sign followed by the API secret.
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
