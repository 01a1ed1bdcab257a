//! Capture pipeline controller
//!
//! Orchestrates the two-stage pipeline: image -> Document AI extraction ->
//! OpenAI analysis. The outcome is an explicit enum, one variant per
//! terminal state, so the partial-success rule is carried by the type:
//! `AnalysisFailed` cannot be constructed without the extracted text that
//! survived the first stage.
//!
//! Neither stage is retried. Extraction failure short-circuits before the
//! analyzer is ever invoked.

use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::services::documentai::{DocumentAiResponse, ExtractionMetadata};
use crate::services::{DocumentExtractor, TextAnalyzer, UploadedImage};

use super::models::{CaptureResult, ImageInfo};

/// Terminal state of one capture request
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Input validation failed before any external call
    Rejected { error: String },
    /// Extraction stage failed or produced no text; the gateway's tagged
    /// response travels with the error for diagnostics
    ExtractionFailed { document: DocumentAiResponse },
    /// Analysis stage yielded nothing; the extracted text is preserved so
    /// the caller does not lose the work the first stage already did
    AnalysisFailed {
        extracted_text: String,
        error: String,
    },
    /// Both stages succeeded
    Done {
        result: CaptureResult,
        extracted_text: String,
        language: String,
        document_metadata: ExtractionMetadata,
        image_info: ImageInfo,
    },
}

/// Run one capture request through both gateways
pub async fn run_capture<E, A>(
    extractor: &E,
    analyzer: &A,
    image: Option<UploadedImage>,
    language: &str,
) -> CaptureOutcome
where
    E: DocumentExtractor + ?Sized,
    A: TextAnalyzer + ?Sized,
{
    let image = match image {
        Some(image) => image,
        None => {
            return CaptureOutcome::Rejected {
                error: "No image file uploaded. Please provide an image file using field name \"image\"."
                    .to_string(),
            }
        }
    };

    if language.trim().is_empty() {
        return CaptureOutcome::Rejected {
            error: "Language parameter is required".to_string(),
        };
    }

    info!(
        image = %image.name,
        size = image.size(),
        language = %language,
        "Processing image with Document AI"
    );

    let document = extractor.process_document(&image).await;

    let extracted_text = if document.success {
        document.extracted_text().map(|text| text.to_string())
    } else {
        None
    };
    let extracted_text = match extracted_text {
        Some(text) => text,
        None => {
            warn!(
                error = ?document.error,
                "Text extraction failed, skipping analysis stage"
            );
            return CaptureOutcome::ExtractionFailed { document };
        }
    };

    info!(text_len = extracted_text.len(), "Processing text with OpenAI");

    match analyzer.process_text(&extracted_text, language).await {
        Ok(Some(result)) => CaptureOutcome::Done {
            result,
            extracted_text,
            language: language.to_string(),
            document_metadata: document.metadata,
            image_info: ImageInfo {
                original_name: image.name.clone(),
                size: image.size(),
                mime_type: image.mime_type.clone(),
            },
        },
        Ok(None) => CaptureOutcome::AnalysisFailed {
            extracted_text,
            error: "Failed to generate response from OpenAI".to_string(),
        },
        Err(e) => {
            warn!(error = %e, "Text analysis failed, extracted text preserved in response");
            CaptureOutcome::AnalysisFailed {
                extracted_text,
                error: e.to_string(),
            }
        }
    }
}

impl IntoResponse for CaptureOutcome {
    fn into_response(self) -> axum::response::Response {
        match self {
            CaptureOutcome::Rejected { error } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": error,
                })),
            )
                .into_response(),
            CaptureOutcome::ExtractionFailed { document } => {
                let error = document
                    .error
                    .clone()
                    .unwrap_or_else(|| "Failed to extract text from image".to_string());
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "success": false,
                        "error": error,
                        "documentAI": document,
                    })),
                )
                    .into_response()
            }
            CaptureOutcome::AnalysisFailed {
                extracted_text,
                error,
            } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": error,
                    "documentAI": {
                        "success": true,
                        "extractedText": extracted_text,
                    },
                })),
            )
                .into_response(),
            CaptureOutcome::Done {
                result,
                extracted_text,
                language,
                document_metadata,
                image_info,
            } => (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "data": result,
                    "metadata": {
                        "extractedText": extracted_text,
                        "language": language,
                        "documentAI": document_metadata,
                        "imageInfo": image_info,
                        "timestamp": Utc::now().to_rfc3339(),
                    },
                })),
            )
                .into_response(),
        }
    }
}
