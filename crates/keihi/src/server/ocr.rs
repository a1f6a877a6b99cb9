//! The OCR side endpoint: a thin transport wrapper over the field
//! extraction adapter.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::extract::extract_from_base64;
use crate::server::{map_error, ErrorBody, ServerState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrRequest {
    pub file_base64: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    pub text: String,
    pub merchant: String,
    pub date: String,
    pub amount: String,
    pub currency: String,
}

/// POST /ocr
///
/// `{fileBase64, fileName?, fileType?}` → extracted receipt fields.
pub(crate) async fn recognize(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<OcrRequest>,
) -> Result<Json<OcrResponse>, (StatusCode, Json<ErrorBody>)> {
    let Some(file_base64) = payload.file_base64.filter(|value| !value.is_empty()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "fileBase64 is required".to_string(),
            }),
        ));
    };
    let file_name = payload.file_name.unwrap_or_else(|| "receipt".to_string());
    let file_type = payload
        .file_type
        .unwrap_or_else(|| "image/png".to_string());

    let fields = extract_from_base64(state.ocr.as_ref(), &file_base64, &file_type, &file_name)
        .await
        .map_err(map_error)?;

    Ok(Json(OcrResponse {
        text: fields.text,
        merchant: fields.merchant,
        date: fields.date,
        amount: fields.amount,
        currency: fields.currency,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::test_state;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    #[tokio::test]
    async fn missing_payload_is_a_bad_request() {
        let state = test_state("unused");
        let request = OcrRequest {
            file_base64: None,
            file_name: None,
            file_type: None,
        };
        let (status, body) = recognize(State(state), Json(request))
            .await
            .expect_err("bad request");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "fileBase64 is required");
    }

    #[tokio::test]
    async fn malformed_base64_is_a_bad_request() {
        let state = test_state("unused");
        let request = OcrRequest {
            file_base64: Some("not base64!!!".to_string()),
            file_name: None,
            file_type: None,
        };
        let (status, _) = recognize(State(state), Json(request))
            .await
            .expect_err("bad request");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn returns_extracted_fields() {
        let state = test_state("コーヒー店\n2024.03.05\nTotal: ¥1,234");
        let request = OcrRequest {
            file_base64: Some(STANDARD.encode(b"png bytes")),
            file_name: Some("receipt.png".to_string()),
            file_type: Some("image/png".to_string()),
        };
        let Json(response) = recognize(State(state), Json(request))
            .await
            .expect("recognize");
        assert_eq!(response.merchant, "コーヒー店");
        assert_eq!(response.date, "2024/03/05");
        assert_eq!(response.amount, "1234.00");
        assert_eq!(response.currency, "JPY");
    }
}
