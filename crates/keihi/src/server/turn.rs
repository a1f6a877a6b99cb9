//! The turn endpoint: hands an inbound event to the dialogue engine and
//! returns the resulting status update.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::engine::{TurnRequest, TurnUpdate};
use crate::server::{map_error, ErrorBody, ServerState};

/// POST /turn
pub(crate) async fn run_turn(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnUpdate>, (StatusCode, Json<ErrorBody>)> {
    let update = state.agent.execute(&request).await.map_err(map_error)?;
    Ok(Json(update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InboundPart, TaskState, TurnPayload};
    use crate::server::tests::test_state;
    use serde_json::json;

    #[tokio::test]
    async fn submit_turn_round_trips_through_the_endpoint() {
        let state = test_state("unused");
        let request = TurnRequest {
            parts: vec![InboundPart::Data(json!({
                "userAction": {
                    "actionName": "submit_expense",
                    "context": {"merchant": "コーヒー店", "amount": "1234.00", "currency": "JPY"}
                }
            }))],
            ui_supported: true,
            task: None,
        };

        let Json(update) = run_turn(State(state), Json(request)).await.expect("turn");
        assert_eq!(update.state, TaskState::Completed);
        assert!(update.is_final);
        assert!(matches!(update.payload, TurnPayload::Ui(_)));
    }

    #[tokio::test]
    async fn request_defaults_ui_support_to_true() {
        let raw = json!({"parts": [{"text": "こんにちは"}]});
        let request: TurnRequest = serde_json::from_value(raw).expect("parse");
        assert!(request.ui_supported);
    }
}
