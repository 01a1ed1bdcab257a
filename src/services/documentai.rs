// src/services/documentai.rs
//! Document Extraction Gateway
//!
//! Wraps the Google Document AI `:process` REST endpoint. Uploaded images
//! are validated, base64-encoded into the provider request, and the nested
//! page/entity response is normalized into a flat extraction result.
//!
//! The gateway never returns `Err` from `process_document`: validation and
//! provider failures come back as a tagged `{success: false}` response so
//! callers can still inspect the request metadata (processor id, location,
//! wall-clock processing time).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::common::ValidationResult;

/// MIME types Document AI accepts for image processing
const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/tiff",
    "image/bmp",
    "image/webp",
];

/// Upload size ceiling, 5 MiB
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// OAuth scope required by the Document AI API
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(Debug, thiserror::Error)]
pub enum DocumentAiError {
    #[error("Document AI not configured: {0}")]
    NotConfigured(String),

    #[error("Service account authentication failed: {0}")]
    AuthFailed(String),

    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct DocumentAiConfig {
    pub project_id: String,
    pub location: String,
    pub processor_id: String,
    pub credentials_path: Option<String>,
}

impl DocumentAiConfig {
    pub fn from_env() -> Self {
        Self {
            project_id: env::var("GOOGLE_CLOUD_PROJECT_ID").unwrap_or_default(),
            location: env::var("GOOGLE_CLOUD_LOCATION").unwrap_or_default(),
            processor_id: env::var("GOOGLE_CLOUD_PROCESSOR_ID").unwrap_or_default(),
            credentials_path: env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.project_id.is_empty() {
            result.add_error("project_id", "Project ID is required");
        }
        if self.location.is_empty() {
            result.add_error("location", "Location is required");
        }
        if self.processor_id.is_empty() {
            result.add_error("processor_id", "Processor ID is required");
        }

        result
    }

    /// Fully-qualified processor resource name used in the `:process` call
    fn processor_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/processors/{}",
            self.project_id, self.location, self.processor_id
        )
    }
}

/// An uploaded image, already pulled out of the multipart body
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub name: String,
}

impl UploadedImage {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

// ============================================================================
// Normalized extraction result
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub page_number: i64,
    pub text: String,
    pub entities: Vec<DocumentEntity>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExtractionData {
    pub text: String,
    pub entities: Vec<DocumentEntity>,
    pub pages: Vec<DocumentPage>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    pub processor_id: String,
    pub location: String,
    pub processing_time: u128,
}

/// Tagged gateway result. `metadata` is populated on both branches so a
/// failed call still reports which processor handled it and how long it took.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentAiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractionData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: ExtractionMetadata,
}

impl DocumentAiResponse {
    pub fn extracted_text(&self) -> Option<&str> {
        self.data
            .as_ref()
            .map(|d| d.text.as_str())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentAiStatus {
    pub status: String,
    pub errors: Vec<String>,
}

// ============================================================================
// Document AI wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    raw_document: RawDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    content: String,
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    document: Option<WireDocument>,
}

#[derive(Debug, Deserialize, Default)]
struct WireDocument {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<WirePage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePage {
    #[serde(default)]
    page_number: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    entities: Vec<WireEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntity {
    #[serde(rename = "type")]
    entity_type: Option<String>,
    value: Option<String>,
    confidence: Option<f64>,
    bounding_box: Option<WireBoundingPoly>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBoundingPoly {
    #[serde(default)]
    normalized_vertices: Vec<WireVertex>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
struct WireVertex {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

// ============================================================================
// Service account token exchange
// ============================================================================

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

// ============================================================================
// Service
// ============================================================================

/// Document AI gateway. Constructed once at startup and shared via
/// `AppState`; the token cache is the only interior mutability.
#[derive(Debug)]
pub struct DocumentAiService {
    config: DocumentAiConfig,
    client: Client,
    token: RwLock<Option<CachedToken>>,
}

/// Seam for the capture pipeline, so tests can substitute a fake extractor
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn process_document(&self, file: &UploadedImage) -> DocumentAiResponse;
}

impl DocumentAiService {
    pub fn new(config: DocumentAiConfig, client: Client) -> Self {
        Self {
            config,
            client,
            token: RwLock::new(None),
        }
    }

    pub fn get_status(&self) -> DocumentAiStatus {
        let validation = self.config.validate();
        DocumentAiStatus {
            status: if validation.is_valid {
                "ready".to_string()
            } else {
                "configuration_error".to_string()
            },
            errors: validation
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect(),
        }
    }

    /// Get a cached access token, exchanging a fresh service-account
    /// assertion when the cache is empty or near expiry. The write lock
    /// serializes concurrent first-callers so only one exchange runs.
    async fn access_token(&self) -> Result<String, DocumentAiError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() + Duration::seconds(60) {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.token.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.token.clone());
            }
        }

        let key = self.load_service_account_key().await?;
        let assertion = self.sign_assertion(&key)?;

        debug!(token_uri = %key.token_uri, "Exchanging service account assertion for access token");

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DocumentAiError::AuthFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Token exchange failed");
            return Err(DocumentAiError::AuthFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| DocumentAiError::AuthFailed(e.to_string()))?;

        let token = CachedToken {
            token: token_response.access_token,
            expires_at: Utc::now() + Duration::seconds(token_response.expires_in.max(0)),
        };
        let access_token = token.token.clone();
        *cached = Some(token);

        Ok(access_token)
    }

    async fn load_service_account_key(&self) -> Result<ServiceAccountKey, DocumentAiError> {
        let path = self
            .config
            .credentials_path
            .as_deref()
            .ok_or_else(|| {
                DocumentAiError::NotConfigured("credentials path is required".to_string())
            })?;

        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            DocumentAiError::NotConfigured(format!("cannot read credentials file: {}", e))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            DocumentAiError::NotConfigured(format!("malformed credentials file: {}", e))
        })
    }

    fn sign_assertion(&self, key: &ServiceAccountKey) -> Result<String, DocumentAiError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: key.client_email.clone(),
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            aud: key.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| DocumentAiError::AuthFailed(format!("invalid private key: {}", e)))?;

        encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| DocumentAiError::AuthFailed(e.to_string()))
    }

    fn failure(&self, error: String, started: Instant) -> DocumentAiResponse {
        DocumentAiResponse {
            success: false,
            data: None,
            error: Some(error),
            metadata: self.metadata(started),
        }
    }

    fn metadata(&self, started: Instant) -> ExtractionMetadata {
        ExtractionMetadata {
            processor_id: self.config.processor_id.clone(),
            location: self.config.location.clone(),
            processing_time: started.elapsed().as_millis(),
        }
    }
}

#[async_trait]
impl DocumentExtractor for DocumentAiService {
    /// Process an image through Document AI, returning a tagged result
    async fn process_document(&self, file: &UploadedImage) -> DocumentAiResponse {
        let started = Instant::now();

        if let Err(message) = validate_file(file) {
            return self.failure(message, started);
        }

        let token = match self.access_token().await {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "Document AI authentication failed");
                return self.failure(e.to_string(), started);
            }
        };

        let url = format!(
            "https://{}-documentai.googleapis.com/v1/{}:process",
            self.config.location,
            self.config.processor_name()
        );

        let request = ProcessRequest {
            raw_document: RawDocument {
                content: BASE64.encode(&file.bytes),
                mime_type: file.mime_type.clone(),
            },
        };

        debug!(
            processor = %self.config.processor_name(),
            mime_type = %file.mime_type,
            size = file.size(),
            "Sending Document AI process request"
        );

        let response = match self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "Document AI request failed");
                return self.failure(
                    DocumentAiError::RequestFailed(e.to_string()).to_string(),
                    started,
                );
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Document AI returned error status");
            return self.failure(
                DocumentAiError::RequestFailed(format!("HTTP {}: {}", status, error_text))
                    .to_string(),
                started,
            );
        }

        let process_response = match response.json::<ProcessResponse>().await {
            Ok(r) => r,
            Err(e) => {
                return self.failure(
                    DocumentAiError::InvalidResponse(e.to_string()).to_string(),
                    started,
                );
            }
        };

        let document = process_response.document.unwrap_or_default();
        let entities = extract_entities(&document.pages);
        let pages = extract_pages(&document.pages);
        let confidence = average_confidence(&entities);

        info!(
            text_len = document.text.len(),
            entity_count = entities.len(),
            page_count = pages.len(),
            "Document AI extraction completed"
        );

        DocumentAiResponse {
            success: true,
            data: Some(ExtractionData {
                text: document.text,
                entities,
                pages,
                confidence,
            }),
            error: None,
            metadata: self.metadata(started),
        }
    }
}

// ============================================================================
// Validation and normalization
// ============================================================================

fn validate_file(file: &UploadedImage) -> Result<(), String> {
    if file.bytes.is_empty() {
        return Err("No image file provided or file buffer is empty".to_string());
    }

    if !ALLOWED_MIME_TYPES.contains(&file.mime_type.as_str()) {
        return Err(format!(
            "Unsupported image type: {}. Supported image types: {}",
            file.mime_type,
            ALLOWED_MIME_TYPES.join(", ")
        ));
    }

    if file.size() > MAX_IMAGE_SIZE {
        return Err(format!(
            "Image file too large. Maximum size is {}MB",
            MAX_IMAGE_SIZE / (1024 * 1024)
        ));
    }

    Ok(())
}

fn convert_entity(entity: &WireEntity) -> DocumentEntity {
    let bounding_box = entity.bounding_box.as_ref().map(|poly| {
        let first = poly.normalized_vertices.first().copied().unwrap_or_default();
        let third = poly.normalized_vertices.get(2).copied().unwrap_or_default();
        BoundingBox {
            x: first.x,
            y: first.y,
            width: third.x - first.x,
            height: third.y - first.y,
        }
    });

    DocumentEntity {
        entity_type: entity.entity_type.clone().unwrap_or_default(),
        value: entity.value.clone().unwrap_or_default(),
        confidence: entity.confidence.unwrap_or(0.0),
        bounding_box,
    }
}

fn extract_entities(pages: &[WirePage]) -> Vec<DocumentEntity> {
    pages
        .iter()
        .flat_map(|page| page.entities.iter().map(convert_entity))
        .collect()
}

fn extract_pages(pages: &[WirePage]) -> Vec<DocumentPage> {
    pages
        .iter()
        .map(|page| {
            let entities: Vec<DocumentEntity> = page.entities.iter().map(convert_entity).collect();
            let confidence = average_confidence(&entities);
            DocumentPage {
                page_number: page.page_number,
                text: page.text.clone(),
                entities,
                confidence,
            }
        })
        .collect()
}

fn average_confidence(entities: &[DocumentEntity]) -> f64 {
    if entities.is_empty() {
        return 0.0;
    }
    entities.iter().map(|e| e.confidence).sum::<f64>() / entities.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> DocumentAiService {
        DocumentAiService::new(
            DocumentAiConfig {
                project_id: "test-project".to_string(),
                location: "eu".to_string(),
                processor_id: "proc-123".to_string(),
                credentials_path: None,
            },
            Client::new(),
        )
    }

    fn image(mime: &str, size: usize) -> UploadedImage {
        UploadedImage {
            bytes: vec![0u8; size],
            mime_type: mime.to_string(),
            name: "photo.jpg".to_string(),
        }
    }

    #[test]
    fn test_validate_rejects_pdf() {
        let err = validate_file(&image("application/pdf", 1024)).unwrap_err();
        assert!(err.contains("Unsupported image type: application/pdf"));
    }

    #[test]
    fn test_validate_rejects_oversized_file() {
        let err = validate_file(&image("image/jpeg", MAX_IMAGE_SIZE + 1)).unwrap_err();
        assert!(err.contains("Maximum size is 5MB"));
    }

    #[test]
    fn test_validate_accepts_all_image_types() {
        for mime in ALLOWED_MIME_TYPES {
            assert!(validate_file(&image(mime, 10 * 1024)).is_ok());
        }
    }

    #[tokio::test]
    async fn test_process_rejects_invalid_file_before_any_network_call() {
        // The dummy config has no credentials, so reaching the token
        // exchange would produce a NotConfigured error instead of the
        // validation message asserted here.
        let service = test_service();
        let result = service
            .process_document(&image("application/pdf", 1024))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unsupported image type"));
        assert_eq!(result.metadata.processor_id, "proc-123");
        assert_eq!(result.metadata.location, "eu");
    }

    #[test]
    fn test_config_validation_names_missing_fields() {
        let config = DocumentAiConfig {
            project_id: String::new(),
            location: "eu".to_string(),
            processor_id: String::new(),
            credentials_path: None,
        };
        let result = config.validate();
        assert!(!result.is_valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["project_id", "processor_id"]);
    }

    #[test]
    fn test_page_confidence_is_mean_of_entity_confidences() {
        let pages = vec![WirePage {
            page_number: 1,
            text: "Hola mundo".to_string(),
            entities: vec![
                WireEntity {
                    entity_type: Some("line".to_string()),
                    value: Some("Hola".to_string()),
                    confidence: Some(0.9),
                    bounding_box: None,
                },
                WireEntity {
                    entity_type: Some("line".to_string()),
                    value: Some("mundo".to_string()),
                    confidence: Some(0.7),
                    bounding_box: None,
                },
            ],
        }];

        let extracted = extract_pages(&pages);
        assert_eq!(extracted.len(), 1);
        assert!((extracted[0].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_page_confidence_is_zero_without_entities() {
        let pages = vec![WirePage {
            page_number: 1,
            text: "blank".to_string(),
            entities: vec![],
        }];

        let extracted = extract_pages(&pages);
        assert_eq!(extracted[0].confidence, 0.0);
        assert_eq!(average_confidence(&extracted[0].entities), 0.0);
    }

    #[test]
    fn test_bounding_box_uses_opposite_vertices() {
        let entity = WireEntity {
            entity_type: Some("block".to_string()),
            value: Some("x".to_string()),
            confidence: Some(1.0),
            bounding_box: Some(WireBoundingPoly {
                normalized_vertices: vec![
                    WireVertex { x: 0.1, y: 0.2 },
                    WireVertex { x: 0.5, y: 0.2 },
                    WireVertex { x: 0.5, y: 0.6 },
                    WireVertex { x: 0.1, y: 0.6 },
                ],
            }),
        };

        let converted = convert_entity(&entity);
        let bounding_box = converted.bounding_box.unwrap();
        assert!((bounding_box.x - 0.1).abs() < 1e-9);
        assert!((bounding_box.y - 0.2).abs() < 1e-9);
        assert!((bounding_box.width - 0.4).abs() < 1e-9);
        assert!((bounding_box.height - 0.4).abs() < 1e-9);
    }
}
