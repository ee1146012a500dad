//! Video upload.

use std::path::Path;

use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use mood_models::JobId;
use mood_worker::JobRequest;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

const DEFAULT_EXTENSION: &str = "mp4";

/// Upload accepted response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub video_url: String,
    pub job_id: JobId,
}

/// `POST /upload`: store the `video` field and start analysing it.
///
/// An optional `keyword` field sets the story theme. Without a `video`
/// file part, including bodies that are not multipart at all, the request
/// is rejected and no job is started.
pub async fn upload_video(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!(error = %rejection, "Upload is not a multipart form");
            return Err(missing_video());
        }
    };

    let job_id = JobId::new();
    let mut saved: Option<(String, u64)> = None;
    let mut keyword: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            // Plain text parts named `video` are not files
            Some("video") if saved.is_none() && field.file_name().is_some() => {
                let file_name = format!("{}.{}", job_id, extension_for(field.file_name()));
                let path = state.config.upload_dir.join(&file_name);
                let bytes = save_field(field, &path).await?;
                saved = Some((file_name, bytes));
            }
            Some("keyword") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid keyword field: {}", e)))?;
                keyword = Some(text);
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = saved else {
        return Err(missing_video());
    };

    info!(job_id = %job_id, file = %file_name, bytes, "Video uploaded");
    metrics::record_upload_accepted(bytes);

    let path = state.config.upload_dir.join(&file_name);
    let request = JobRequest::new(job_id, path).with_keyword(keyword);
    let job_id = state.jobs.start(request).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            message: "Video accepted",
            video_url: format!("/uploads/{}", file_name),
            job_id,
        }),
    ))
}

fn missing_video() -> ApiError {
    metrics::record_upload_rejected("missing_video");
    ApiError::bad_request("No video uploaded")
}

/// Stream one multipart field to `path`, removing the file on failure.
async fn save_field(field: Field<'_>, path: &Path) -> ApiResult<u64> {
    match write_field(field, path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %remove_err, "Failed to remove partial upload");
            }
            Err(e)
        }
    }
}

async fn write_field(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(format!("Upload interrupted: {}", e)))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// Extension of the client file name when it is short and alphanumeric.
fn extension_for(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for(Some("holiday.MOV")), "mov");
        assert_eq!(extension_for(Some("clip.webm")), "webm");
        assert_eq!(extension_for(Some("no_extension")), "mp4");
        assert_eq!(extension_for(Some("../../etc/passwd.sh;rm")), "mp4");
        assert_eq!(extension_for(None), "mp4");
    }
}
