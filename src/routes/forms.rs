//! Form API endpoints
//!
//! - Analyze a PDF and synthesize fields for the prompts it contains
//! - Fill fields with text, checkbox states and signature images
//! - Extract the oracle's key/value pairs
//! - List the fields a PDF already carries

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::Response,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::forms::{self, parse_checkbox_token, AnalyzeResult, FillOptions, InspectResult, ValueMap};
use crate::oracle::KeyValuePair;
use crate::state::AppState;

/// Header carrying the number of fields a fill request could not apply
pub const SKIPPED_FIELDS_HEADER: &str = "x-skipped-fields";

const FILLED_FILENAME: &str = "filled-form.pdf";

/// Response for key/value extraction
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPdfResponse {
    pub form_fields: Vec<KeyValuePair>,
}

/// Create the forms router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/analyze-form", post(analyze_form))
        .route("/fill-form", post(fill_form))
        .route("/process-pdf", post(process_pdf))
        .route("/form-fields", post(form_fields))
}

/// Multipart parts understood by the form endpoints
#[derive(Default)]
struct FormUpload {
    pdf: Option<Bytes>,
    values: Option<String>,
    flatten: Option<bool>,
}

impl FormUpload {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut upload = FormUpload::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::bad_request("Failed to read upload", e.to_string()))?
        {
            let name = field.name().unwrap_or("").to_string();
            tracing::debug!(
                "Received field: name='{}', filename={:?}, content_type={:?}",
                name,
                field.file_name(),
                field.content_type()
            );

            match name.as_str() {
                "pdf" | "file" => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::bad_request("Failed to read file data", e.to_string()))?;
                    tracing::debug!("Read {} bytes of file data", data.len());
                    upload.pdf = Some(data);
                }
                "values" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::bad_request("Failed to read field values", e.to_string()))?;
                    upload.values = Some(text);
                }
                "flatten" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::bad_request("Failed to read flatten flag", e.to_string()))?;
                    let flag = parse_checkbox_token(&text).ok_or_else(|| {
                        AppError::bad_request("Invalid flatten flag", format!("expected a boolean, got {:?}", text))
                    })?;
                    upload.flatten = Some(flag);
                }
                _ => tracing::debug!("Ignoring multipart field '{}'", name),
            }
        }

        Ok(upload)
    }

    fn require_pdf(&mut self) -> Result<Bytes> {
        self.pdf
            .take()
            .ok_or_else(|| AppError::bad_request("No PDF file provided", "expected a multipart part named 'pdf'"))
    }
}

/// Detect prompts and return the PDF with synthesized fields
async fn analyze_form(State(state): State<AppState>, multipart: Multipart) -> Result<Json<AnalyzeResult>> {
    let request_id = Uuid::new_v4();

    async move {
        let pdf = FormUpload::read(multipart).await?.require_pdf()?;
        tracing::info!("Analyzing {} byte PDF", pdf.len());

        let result = state
            .analyzer()
            .analyze(pdf.to_vec())
            .await
            .map_err(|e| AppError::from_form("Failed to analyze form", e))?;

        tracing::info!(
            "Synthesized {} fields ({} skipped) across {} pages",
            result.form_fields.len(),
            result.skipped_fields.len(),
            result.page_count
        );
        Ok(Json(result))
    }
    .instrument(tracing::info_span!("analyze_form", %request_id))
    .await
}

/// Apply a value map and return the filled PDF as an attachment
async fn fill_form(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let request_id = Uuid::new_v4();

    async move {
        let mut upload = FormUpload::read(multipart).await?;
        let pdf = upload.require_pdf()?;
        let raw_values = upload
            .values
            .take()
            .ok_or_else(|| AppError::bad_request("No field values provided", "expected a multipart part named 'values'"))?;
        let values = ValueMap::from_json(&raw_values).map_err(|e| AppError::from_form("Invalid field values", e))?;
        let options = FillOptions {
            flatten: upload.flatten.unwrap_or(state.config().fill.flatten_by_default),
        };
        tracing::info!("Filling {} fields (flatten: {})", values.len(), options.flatten);

        let outcome = tokio::task::spawn_blocking(move || forms::fill_form(&pdf, &values, options))
            .await
            .map_err(|e| AppError::internal("Fill task failed", e.to_string()))?
            .map_err(|e| AppError::from_form("Failed to fill form", e))?;

        tracing::info!("Filled {} fields, skipped {}", outcome.filled.len(), outcome.skipped.len());

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/pdf")
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", FILLED_FILENAME),
            )
            .header(SKIPPED_FIELDS_HEADER, outcome.skipped.len())
            .body(Body::from(outcome.pdf))
            .map_err(|e| AppError::internal("Failed to build response", e.to_string()))
    }
    .instrument(tracing::info_span!("fill_form", %request_id))
    .await
}

/// Key/value pairs detected by the oracle
async fn process_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Json<ProcessPdfResponse>> {
    let request_id = Uuid::new_v4();

    async move {
        let pdf = FormUpload::read(multipart).await?.require_pdf()?;
        let form_fields = state
            .analyzer()
            .extract_pairs(&pdf)
            .await
            .map_err(|e| AppError::from_form("Failed to process PDF", e))?;

        tracing::info!("Extracted {} key/value pairs", form_fields.len());
        Ok(Json(ProcessPdfResponse { form_fields }))
    }
    .instrument(tracing::info_span!("process_pdf", %request_id))
    .await
}

/// Fields already present in the PDF
async fn form_fields(State(state): State<AppState>, multipart: Multipart) -> Result<Json<InspectResult>> {
    let pdf = FormUpload::read(multipart).await?.require_pdf()?;
    let keywords = state.keywords().clone();

    let result = tokio::task::spawn_blocking(move || forms::inspect_fields(&pdf, &keywords))
        .await
        .map_err(|e| AppError::internal("Inspect task failed", e.to_string()))?
        .map_err(|e| AppError::from_form("Failed to read form fields", e))?;

    tracing::debug!("PDF carries {} fields", result.form_fields.len());
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::forms::oracle_fixtures::sample_form;
    use crate::forms::pdf_fixtures::{blank_pdf, tiny_png};
    use crate::forms::{FormDocument, PdfRect};
    use crate::oracle::{DocumentAnalyzer, MockAnalyzer};

    const BOUNDARY: &str = "formins-test-boundary";

    enum Part<'a> {
        File(&'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::File(name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"form.pdf\"\r\nContent-Type: application/pdf\r\n\r\n",
                            name
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value).as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn app_with(oracle: Arc<dyn DocumentAnalyzer>) -> Router {
        crate::routes::app(AppState::with_oracle(Config::default(), oracle))
    }

    fn app() -> Router {
        app_with(Arc::new(MockAnalyzer::returning(sample_form())))
    }

    async fn send(app: Router, uri: &str, parts: &[Part<'_>]) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn form_with_name_field() -> Vec<u8> {
        let mut doc = FormDocument::load(&blank_pdf(1)).unwrap();
        doc.add_text_field(1, "full_name", &PdfRect::new(100.0, 700.0, 150.0, 16.0), 10.0)
            .unwrap();
        doc.add_checkbox(1, "i_agree", &PdfRect::new(100.0, 650.0, 12.0, 12.0))
            .unwrap();
        doc.add_text_field(1, "signature", &PdfRect::new(50.0, 100.0, 100.0, 50.0), 0.0)
            .unwrap();
        doc.save().unwrap()
    }

    #[tokio::test]
    async fn test_analyze_form() {
        let pdf = blank_pdf(1);
        let response = send(app(), "/api/analyze-form", &[Part::File("pdf", &pdf)]).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["pageCount"], 1);
        let names: Vec<&str> = body["formFields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["full_name", "i_agree"]);

        let modified = BASE64.decode(body["modifiedPdf"].as_str().unwrap()).unwrap();
        let doc = FormDocument::load(&modified).unwrap();
        assert!(doc.has_field("full_name"));
        assert!(doc.has_field("i_agree"));
    }

    #[tokio::test]
    async fn test_analyze_accepts_file_part() {
        let pdf = blank_pdf(1);
        let response = send(app(), "/api/analyze-form", &[Part::File("file", &pdf)]).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyze_without_pdf() {
        let response = send(app(), "/api/analyze-form", &[Part::Text("values", "{}")]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "No PDF file provided");
    }

    #[tokio::test]
    async fn test_analyze_invalid_pdf() {
        let response = send(app(), "/api/analyze-form", &[Part::File("pdf", b"not a pdf")]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Failed to analyze form");
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn test_analyze_oracle_failure() {
        let pdf = blank_pdf(1);
        let app = app_with(Arc::new(MockAnalyzer::failing()));
        let response = send(app, "/api/analyze-form", &[Part::File("pdf", &pdf)]).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_fill_form() {
        let pdf = form_with_name_field();
        let response = send(
            app(),
            "/api/fill-form",
            &[
                Part::File("pdf", &pdf),
                Part::Text("values", r#"{"full_name": "Jane Doe", "i_agree": true}"#),
            ],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"filled-form.pdf\""
        );
        assert_eq!(response.headers()[SKIPPED_FIELDS_HEADER], "0");

        let filled = FormDocument::load(&body_bytes(response).await).unwrap();
        let value = filled.field_entry("full_name", b"V").unwrap();
        assert_eq!(value.as_str().unwrap(), b"Jane Doe");
        let state = filled.field_entry("i_agree", b"AS").unwrap();
        assert_eq!(state.as_name().unwrap(), b"Yes");
    }

    #[tokio::test]
    async fn test_fill_signature_image() {
        let pdf = form_with_name_field();
        let values = format!(r#"{{"signature": "data:image/png;base64,{}"}}"#, BASE64.encode(tiny_png()));
        let response = send(
            app(),
            "/api/fill-form",
            &[Part::File("pdf", &pdf), Part::Text("values", &values)],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SKIPPED_FIELDS_HEADER], "0");

        let filled = FormDocument::load(&body_bytes(response).await).unwrap();
        assert!(!filled.has_field("signature"));
        let content = String::from_utf8_lossy(&filled.page_content(1)).to_string();
        assert!(content.contains("/FmImg0 Do"));
    }

    #[tokio::test]
    async fn test_fill_reports_skipped_fields() {
        let pdf = form_with_name_field();
        let response = send(
            app(),
            "/api/fill-form",
            &[
                Part::File("pdf", &pdf),
                Part::Text("values", r#"{"full_name": "Jane", "missing": "x", "i_agree": "maybe"}"#),
            ],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SKIPPED_FIELDS_HEADER], "2");
    }

    #[tokio::test]
    async fn test_fill_flatten() {
        let pdf = form_with_name_field();
        let response = send(
            app(),
            "/api/fill-form",
            &[
                Part::File("pdf", &pdf),
                Part::Text("values", r#"{"full_name": "Jane"}"#),
                Part::Text("flatten", "true"),
            ],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let filled = FormDocument::load(&body_bytes(response).await).unwrap();
        assert!(filled.fields().is_empty());
    }

    #[tokio::test]
    async fn test_fill_rejects_bad_input() {
        let pdf = form_with_name_field();

        let response = send(
            app(),
            "/api/fill-form",
            &[Part::File("pdf", &pdf), Part::Text("values", "[1, 2]")],
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid field values");

        let response = send(app(), "/api/fill-form", &[Part::File("pdf", &pdf)]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            app(),
            "/api/fill-form",
            &[
                Part::File("pdf", &pdf),
                Part::Text("values", "{}"),
                Part::Text("flatten", "sometimes"),
            ],
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_process_pdf() {
        let pdf = blank_pdf(1);
        let response = send(app(), "/api/process-pdf", &[Part::File("pdf", &pdf)]).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["formFields"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_form_fields() {
        let pdf = form_with_name_field();
        let response = send(app(), "/api/form-fields", &[Part::File("pdf", &pdf)]).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["pageCount"], 1);
        let fields = body["formFields"].as_array().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1]["type"], "checkbox");
        assert_eq!(fields[2]["type"], "signature");
    }
}
