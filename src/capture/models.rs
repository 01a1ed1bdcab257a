//! Capture data models

use serde::{Deserialize, Serialize};

/// A single word or phrase with its English translations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordPhrase {
    pub text: String,
    pub translation: Vec<String>,
}

/// The analysis result returned to the client. Transient - produced per
/// request and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub words: Vec<WordPhrase>,
    pub phrases: Vec<WordPhrase>,
}

/// Query parameters for POST /api/capture
#[derive(Debug, Deserialize)]
pub struct CaptureQuery {
    pub language: Option<String>,
}

/// POST /api/openai/chat payload
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
    pub language: Option<String>,
}

/// Metadata about the uploaded image, echoed back in the success response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub original_name: String,
    pub size: usize,
    pub mime_type: String,
}
