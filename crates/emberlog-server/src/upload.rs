use crate::config::AppConfig;
use crate::error::ApiError;
use crate::pipeline::client_key;
use crate::state::AppState;
use anyhow::Context;
use axum::async_trait;
use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, StatusCode};
use axum::Form;
use emberlog_core::incident::IncidentDraft;
use emberlog_core::upload::{stored_file_name, UploadError};
use emberlog_core::validation::validate_submission;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// URL prefix under which the upload directory is served.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Name of the only multipart file field accepted.
const IMAGE_FIELD: &str = "image";

/// An image that passed the upload checks and is on disk.
#[derive(Debug)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub public_path: String,
}

impl StoredUpload {
    /// Removes the file when the request that carried it fails later on.
    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(path = ?self.path, "Could not remove discarded upload: {}", e);
        }
    }
}

/// Raw fields of a create/update request plus its stored image, if any.
///
/// Accepts `multipart/form-data`, JSON objects and urlencoded forms. Any
/// other (or missing) content type yields no fields at all, which schema
/// validation then rejects.
#[derive(Debug)]
pub struct IncidentSubmission {
    pub fields: Map<String, Value>,
    pub image: Option<StoredUpload>,
}

impl IncidentSubmission {
    /// Runs schema validation. On failure the stored image is removed.
    pub async fn validate(self) -> Result<(IncidentDraft, Option<StoredUpload>), ApiError> {
        match validate_submission(&self.fields) {
            Ok(mut draft) => {
                draft.image = self.image.as_ref().map(|u| u.public_path.clone());
                Ok((draft, self.image))
            }
            Err(errors) => {
                tracing::warn!(errors = errors.len(), "Incident validation failed");
                if let Some(upload) = self.image {
                    upload.discard().await;
                }
                Err(ApiError::Validation(errors))
            }
        }
    }
}

#[async_trait]
impl FromRequest<AppState> for IncidentSubmission {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let client = client_key(&req);
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            let mut submission = IncidentSubmission {
                fields: Map::new(),
                image: None,
            };
            if let Err(e) = read_parts(&mut multipart, &state.config, &client, &mut submission).await {
                if let ApiError::Upload(upload_error) = &e {
                    tracing::warn!(ip = %client, "File upload rejected: {}", upload_error);
                    crate::metrics::record_upload_rejected(upload_error.title());
                }
                if let Some(upload) = submission.image.take() {
                    upload.discard().await;
                }
                return Err(e);
            }
            return Ok(submission);
        }

        let fields = if content_type.starts_with("application/json") {
            let bytes = Bytes::from_request(req, state).await.map_err(|e| {
                if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    ApiError::BodyTooLarge {
                        limit: state.config.body_limit,
                    }
                } else {
                    ApiError::BadRequest(e.body_text())
                }
            })?;
            json_fields(&bytes)?
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            pairs
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect()
        } else {
            Map::new()
        };

        Ok(IncidentSubmission {
            fields,
            image: None,
        })
    }
}

fn json_fields(bytes: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Ok(Map::new()),
        Err(e) => Err(ApiError::BadRequest(format!("Invalid JSON body: {}", e))),
    }
}

async fn read_parts(
    multipart: &mut Multipart,
    config: &AppConfig,
    client: &str,
    submission: &mut IncidentSubmission,
) -> Result<(), ApiError> {
    let policy = &config.upload;
    let mut file_count = 0usize;
    let mut field_count = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            field_count += 1;
            if field_count > policy.max_fields {
                return Err(UploadError::TooManyFields {
                    max: policy.max_fields,
                }
                .into());
            }
            let value = read_text_field(field, &name, policy.max_field_bytes).await?;
            submission.fields.insert(name, Value::String(value));
            continue;
        };

        file_count += 1;
        policy.check_file_count(file_count)?;

        // Browsers send an empty, nameless file part when no file was picked.
        // It still counts as a file and its bytes are still size-checked.
        if file_name.is_empty() {
            drain_field(field, config).await?;
            continue;
        }

        if name != IMAGE_FIELD || submission.image.is_some() {
            return Err(UploadError::UnexpectedFile { field: name }.into());
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        policy.check_file(&file_name, &content_type)?;

        let stored = store_file(field, &file_name, config).await?;
        tracing::info!(
            ip = %client,
            filename = %file_name,
            mimetype = %content_type,
            stored = %stored.public_path,
            "File upload accepted"
        );
        crate::metrics::record_upload_stored();
        submission.image = Some(stored);
    }
    Ok(())
}

async fn read_text_field(mut field: Field<'_>, name: &str, max_bytes: usize) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > max_bytes {
            return Err(UploadError::FieldTooLarge {
                field: name.to_string(),
                max_bytes,
            }
            .into());
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf)
        .map_err(|_| ApiError::BadRequest(format!("Form field {} is not valid UTF-8", name)))
}

async fn store_file(field: Field<'_>, original_name: &str, config: &AppConfig) -> Result<StoredUpload, ApiError> {
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("create upload dir {}", config.upload_dir.display()))?;

    let file_name = stored_file_name(original_name);
    let upload = StoredUpload {
        path: config.upload_dir.join(&file_name),
        public_path: format!("{}/{}", UPLOADS_ROUTE, file_name),
    };
    let file = tokio::fs::File::create(&upload.path)
        .await
        .with_context(|| format!("create {}", upload.path.display()))?;

    match copy_field(field, file, config).await {
        Ok(_) => Ok(upload),
        Err(e) => {
            upload.discard().await;
            Err(e)
        }
    }
}

async fn copy_field(mut field: Field<'_>, mut file: tokio::fs::File, config: &AppConfig) -> Result<u64, ApiError> {
    let mut received: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        received += chunk.len() as u64;
        config.upload.check_size(received)?;
        file.write_all(&chunk).await.context("write upload chunk")?;
    }
    file.flush().await.context("flush upload")?;
    Ok(received)
}

async fn drain_field(mut field: Field<'_>, config: &AppConfig) -> Result<(), ApiError> {
    let mut received: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        received += chunk.len() as u64;
        config.upload.check_size(received)?;
    }
    Ok(())
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Upload error: {}", e.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_fields() {
        assert!(json_fields(b"").unwrap().is_empty());
        assert!(json_fields(b"  \n").unwrap().is_empty());
        assert!(json_fields(b"[1, 2]").unwrap().is_empty());
        assert_eq!(json_fields(br#"{"title":"x"}"#).unwrap()["title"], "x");
        assert!(matches!(json_fields(b"{oops"), Err(ApiError::BadRequest(_))));
    }
}
