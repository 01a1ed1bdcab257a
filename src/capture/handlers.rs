// src/capture/handlers.rs
//! Capture endpoint and gateway status handlers

use axum::{
    extract::{Extension, Multipart, Query},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::auth::SessionUser;
use crate::common::{safe_email_log, ApiError, AppState};
use crate::services::documentai::MAX_IMAGE_SIZE;
use crate::services::{TextAnalyzer, UploadedImage};

use super::models::{AnalyzeRequest, CaptureQuery};
use super::pipeline::{run_capture, CaptureOutcome};

/// MIME types accepted by the upload layer, mirroring what the extraction
/// gateway will accept
const ALLOWED_UPLOAD_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/tiff",
    "image/bmp",
    "image/webp",
];

/// POST /api/capture?language=<code> - run an image through the
/// extraction/analysis pipeline. Requires an authenticated session.
pub async fn capture(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    session: SessionUser,
    Query(params): Query<CaptureQuery>,
    multipart: Multipart,
) -> Result<CaptureOutcome, ApiError> {
    let state = state_lock.read().await.clone();

    tracing::info!(
        user_id = %session.user_id,
        email = %safe_email_log(&session.email),
        "Capture request received"
    );

    let image = read_image_field(multipart).await?;
    let language = params.language.unwrap_or_default();

    Ok(run_capture(
        state.documentai_service.as_ref(),
        state.openai_service.as_ref(),
        image,
        &language,
    )
    .await)
}

/// POST /api/openai/chat - analyze already-extracted text without the OCR
/// stage. Same analyzer, same output contract as the capture pipeline.
pub async fn analyze_text(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    session: SessionUser,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await.clone();

    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("No text supplied".to_string()));
    }
    let language = match payload.language.as_deref() {
        Some(language) if !language.trim().is_empty() => language,
        _ => {
            return Err(ApiError::BadRequest(
                "Language parameter is required".to_string(),
            ))
        }
    };

    tracing::info!(user_id = %session.user_id, "Text analysis request received");

    let result = state
        .openai_service
        .process_text(&payload.text, language)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Failed to generate response".to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": result,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// GET /api/documentai/status - extraction gateway configuration state
pub async fn documentai_status(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> impl IntoResponse {
    let state = state_lock.read().await.clone();
    Json(state.documentai_service.get_status())
}

/// GET /api/openai/status - analysis gateway configuration state
pub async fn openai_status(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> impl IntoResponse {
    let state = state_lock.read().await.clone();
    Json(state.openai_service.get_status())
}

/// Pull exactly one file out of the multipart body. The field must be named
/// `image`; type and size limits are enforced here, before the pipeline
/// controller ever sees the upload.
async fn read_image_field(mut multipart: Multipart) -> Result<Option<UploadedImage>, ApiError> {
    let mut image: Option<UploadedImage> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let is_file = field.file_name().is_some();
        match field.name() {
            Some("image") => {
                if image.is_some() {
                    return Err(ApiError::BadRequest(
                        "Too many files. Only one image file is allowed.".to_string(),
                    ));
                }

                let mime_type = field.content_type().unwrap_or_default().to_string();
                let name = field.file_name().unwrap_or("upload").to_string();

                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::BadRequest("Invalid file".to_string()))?
                    .to_vec();

                if bytes.len() > MAX_IMAGE_SIZE {
                    return Err(ApiError::BadRequest(
                        "Image file too large. Maximum size is 5MB.".to_string(),
                    ));
                }

                if !ALLOWED_UPLOAD_TYPES.contains(&mime_type.as_str()) {
                    return Err(ApiError::BadRequest(format!(
                        "Unsupported file type: {}. Supported image types: {}",
                        mime_type,
                        ALLOWED_UPLOAD_TYPES.join(", ")
                    )));
                }

                if !is_valid_image_bytes(&bytes) {
                    warn!(declared = %mime_type, "Upload magic bytes do not match an accepted image type");
                    return Err(ApiError::BadRequest("Invalid image type".to_string()));
                }

                image = Some(UploadedImage {
                    bytes,
                    mime_type,
                    name,
                });
            }
            _ if is_file => {
                return Err(ApiError::BadRequest(
                    "Unexpected file field. Please use field name \"image\".".to_string(),
                ));
            }
            // Non-file fields are ignored
            _ => {}
        }
    }

    Ok(image)
}

/// Sniff the upload's magic bytes; the declared content type alone is not
/// trusted
fn is_valid_image_bytes(data: &[u8]) -> bool {
    match infer::get(data) {
        Some(kind) => ALLOWED_UPLOAD_TYPES.contains(&kind.mime_type()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request};

    fn jpeg_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.resize(len.max(4), 0);
        data
    }

    fn multipart_request(parts: &[(&str, &str, &str, &[u8])]) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        for (field_name, filename, content_type, data) in parts {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::builder()
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn parse(parts: &[(&str, &str, &str, &[u8])]) -> Result<Option<UploadedImage>, ApiError> {
        use axum::extract::DefaultBodyLimit;
        use tower::{Layer, ServiceExt};

        // Mirror the production route's DefaultBodyLimit so the handler's own
        // size check is exercised. Extracting Multipart directly would leave
        // axum's 2 MiB default body limit in place, which trips during
        // multipart parsing before the 5 MB check is ever reached.
        let svc = DefaultBodyLimit::disable().layer(tower::service_fn(
            |req: Request<Body>| async move {
                let multipart = Multipart::from_request(req, &())
                    .await
                    .expect("multipart extraction");
                Ok::<_, std::convert::Infallible>(read_image_field(multipart).await)
            },
        ));
        svc.oneshot(multipart_request(parts)).await.unwrap()
    }

    fn error_message(err: ApiError) -> String {
        match err {
            ApiError::BadRequest(msg) => msg,
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_magic_byte_sniffing_accepts_jpeg() {
        assert!(is_valid_image_bytes(&jpeg_bytes(32)));
    }

    #[test]
    fn test_magic_byte_sniffing_rejects_pdf() {
        let mut data = b"%PDF-1.4".to_vec();
        data.extend_from_slice(&[0u8; 16]);
        assert!(!is_valid_image_bytes(&data));
    }

    #[test]
    fn test_magic_byte_sniffing_rejects_unknown_bytes() {
        assert!(!is_valid_image_bytes(&[0u8; 32]));
    }

    #[tokio::test]
    async fn test_valid_jpeg_upload_is_accepted() {
        let data = jpeg_bytes(10 * 1024);
        let image = parse(&[("image", "photo.jpg", "image/jpeg", &data)])
            .await
            .expect("upload")
            .expect("image present");

        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.name, "photo.jpg");
        assert_eq!(image.size(), 10 * 1024);
    }

    #[tokio::test]
    async fn test_body_without_file_yields_none() {
        let result = parse(&[]).await.expect("empty body parses");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_wrong_field_name_is_rejected() {
        let data = jpeg_bytes(1024);
        let err = parse(&[("photo", "photo.jpg", "image/jpeg", &data)])
            .await
            .expect_err("wrong field name must fail");
        assert!(error_message(err).contains("field name \"image\""));
    }

    #[tokio::test]
    async fn test_two_files_are_rejected() {
        let data = jpeg_bytes(1024);
        let err = parse(&[
            ("image", "a.jpg", "image/jpeg", &data),
            ("image", "b.jpg", "image/jpeg", &data),
        ])
        .await
        .expect_err("second file must fail");
        assert!(error_message(err).contains("Only one image file"));
    }

    #[tokio::test]
    async fn test_declared_pdf_type_is_rejected() {
        let data = jpeg_bytes(1024);
        let err = parse(&[("image", "doc.pdf", "application/pdf", &data)])
            .await
            .expect_err("pdf type must fail");
        assert!(error_message(err).contains("Unsupported file type: application/pdf"));
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected_with_limit_in_message() {
        let data = jpeg_bytes(MAX_IMAGE_SIZE + 1);
        let err = parse(&[("image", "big.jpg", "image/jpeg", &data)])
            .await
            .expect_err("oversized file must fail");
        assert!(error_message(err).contains("Maximum size is 5MB"));
    }

    #[tokio::test]
    async fn test_mismatched_magic_bytes_are_rejected() {
        let mut data = b"%PDF-1.4".to_vec();
        data.extend_from_slice(&[0u8; 64]);
        let err = parse(&[("image", "fake.jpg", "image/jpeg", &data)])
            .await
            .expect_err("pdf bytes behind a jpeg type must fail");
        assert_eq!(error_message(err), "Invalid image type");
    }
}
