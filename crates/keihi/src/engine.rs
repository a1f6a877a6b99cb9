//! Dialogue engine.
//!
//! One inbound event per turn. The engine classifies the event,
//! dispatches to the extraction adapter, the claim store or the UI
//! builders, and decides the next task lifecycle state. It holds no
//! draft state between turns: every inbound action carries its own
//! full context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use keihi_llm::UiGenerator;

use crate::error::{AgentError, AgentResult};
use crate::extract::{extract_from_base64, OcrBackend, ReceiptFields};
use crate::protocol::UiMessage;
use crate::storage::{ClaimStore, ExpenseDraft};
use crate::ui::{build_confirmation, build_expense_form, build_review_ui, build_search_results};

const MSG_UI_REQUIRED: &str = "UI拡張対応のクライアントから接続してください。";
const MSG_UPLOAD_MISSING: &str = "アップロードデータが見つかりませんでした。";
const MSG_GUIDANCE: &str = "アップロードまたは検索を行ってください。";
const MSG_NOTHING: &str = "処理対象が見つかりませんでした。";

/// Task lifecycle states surfaced to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    InputRequired,
    Completed,
}

/// The unit of work a turn advances. A fresh task is created when the
/// inbound message carries none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionTask {
    pub id: String,
    pub context_id: String,
}

impl InteractionTask {
    fn fresh() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context_id: Uuid::new_v4().to_string(),
        }
    }
}

/// One part of an inbound message: structured action data or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InboundPart {
    #[serde(rename = "data")]
    Data(Value),
    #[serde(rename = "text")]
    Text(String),
}

/// An inbound turn as handed over by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub parts: Vec<InboundPart>,
    /// Whether the client can render the declarative UI protocol.
    #[serde(default = "default_true")]
    pub ui_supported: bool,
    /// The task this message continues, if any.
    #[serde(default)]
    pub task: Option<InteractionTask>,
}

fn default_true() -> bool {
    true
}

/// What a turn produced: a plain-text notice or a UI message batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnPayload {
    Text(String),
    Ui(Vec<UiMessage>),
}

/// The status update emitted at the end of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnUpdate {
    pub task: InteractionTask,
    pub state: TaskState,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub payload: TurnPayload,
}

impl TurnUpdate {
    /// Plain-text updates always terminate the task.
    fn text(task: InteractionTask, message: impl Into<String>) -> Self {
        Self {
            task,
            state: TaskState::Completed,
            is_final: true,
            payload: TurnPayload::Text(message.into()),
        }
    }

    fn ui(task: InteractionTask, state: TaskState, messages: Vec<UiMessage>) -> Self {
        Self {
            task,
            state,
            is_final: state == TaskState::Completed,
            payload: TurnPayload::Ui(messages),
        }
    }
}

/// The actions this agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    UploadReceipt,
    SubmitExpense,
    SearchExpense,
    Unknown,
}

impl ActionKind {
    fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("upload_receipt") => ActionKind::UploadReceipt,
            Some("submit_expense") => ActionKind::SubmitExpense,
            Some("search_expense") => ActionKind::SearchExpense,
            _ => ActionKind::Unknown,
        }
    }
}

/// The inbound event after classification.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedEvent {
    pub action_name: Option<String>,
    pub context: Map<String, Value>,
    pub text: String,
}

impl ClassifiedEvent {
    pub fn kind(&self) -> ActionKind {
        ActionKind::from_name(self.action_name.as_deref())
    }

    fn str_value(&self, key: &str) -> String {
        self.context
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn str_value_or(&self, key: &str, default: &str) -> String {
        match self.context.get(key) {
            Some(value) => value.as_str().unwrap_or(default).to_string(),
            None => default.to_string(),
        }
    }
}

/// Classify the inbound parts.
///
/// For a structured part the `userAction` envelope wins over top-level
/// keys; free text is the last resort. Later data parts override
/// earlier ones. Accepted action-name synonyms: `actionName` | `name` |
/// `action` inside the envelope, `actionName` | `action` at top level.
pub fn classify_parts(parts: &[InboundPart]) -> ClassifiedEvent {
    let mut event = ClassifiedEvent::default();
    for part in parts {
        match part {
            InboundPart::Data(value) => {
                let Some(data) = value.as_object() else { continue };
                if let Some(envelope) = data.get("userAction").and_then(Value::as_object) {
                    event.action_name =
                        first_string(envelope, &["actionName", "name", "action"]);
                    event.context = object_value(envelope.get("context"));
                } else {
                    event.action_name = first_string(data, &["actionName", "action"]);
                    event.context = object_value(data.get("context"));
                }
            }
            InboundPart::Text(text) => event.text = text.clone(),
        }
    }
    event
}

fn first_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn object_value(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// The expense-reporting agent. Stateless across turns; safe to share
/// behind an `Arc` between concurrent requests.
pub struct ExpenseAgent {
    store: Arc<dyn ClaimStore>,
    ocr: Arc<dyn OcrBackend>,
    generator: Option<Arc<dyn UiGenerator>>,
}

impl ExpenseAgent {
    pub fn new(store: Arc<dyn ClaimStore>, ocr: Arc<dyn OcrBackend>) -> Self {
        Self {
            store,
            ocr,
            generator: None,
        }
    }

    /// Wire a generative UI collaborator; uploads then render the
    /// generative review surface instead of the plain form.
    pub fn with_generator(mut self, generator: Arc<dyn UiGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Run one turn to completion and produce the status update.
    pub async fn execute(&self, request: &TurnRequest) -> AgentResult<TurnUpdate> {
        let task = request.task.clone().unwrap_or_else(InteractionTask::fresh);

        if !request.ui_supported {
            return Ok(TurnUpdate::text(task, MSG_UI_REQUIRED));
        }

        let event = classify_parts(&request.parts);
        let mut final_state = TaskState::InputRequired;

        let messages: Option<Vec<UiMessage>> = match event.kind() {
            ActionKind::UploadReceipt => {
                let file_base64 = event.str_value("fileBase64");
                if file_base64.is_empty() {
                    return Ok(TurnUpdate::text(task, MSG_UPLOAD_MISSING));
                }
                let file_name = event.str_value_or("fileName", "receipt");
                let file_type = event.str_value_or("fileType", "image/png");

                let fields = match extract_from_base64(
                    self.ocr.as_ref(),
                    &file_base64,
                    &file_type,
                    &file_name,
                )
                .await
                {
                    Ok(fields) => fields,
                    Err(error @ (AgentError::InvalidInput(_) | AgentError::ExternalService(_))) => {
                        tracing::warn!(%error, "receipt extraction failed");
                        return Ok(TurnUpdate::text(
                            task,
                            format!("領収書を処理できませんでした: {error}"),
                        ));
                    }
                    Err(error) => return Err(error),
                };
                tracing::info!(
                    merchant = %fields.merchant,
                    amount = %fields.amount,
                    currency = %fields.currency,
                    "receipt fields extracted"
                );

                let draft = draft_from_fields(fields);
                let messages = match &self.generator {
                    Some(generator) => build_review_ui(generator.as_ref(), &draft).await,
                    None => build_expense_form(&draft),
                };
                Some(messages)
            }
            ActionKind::SubmitExpense => {
                let draft = draft_from_context(&event);
                let record = self.store.append(draft).await?;
                tracing::info!(id = %record.id, "claim recorded");
                final_state = TaskState::Completed;
                Some(build_confirmation(&record))
            }
            ActionKind::SearchExpense => {
                let query = event.str_value("query");
                let results = self.store.search(&query).await?;
                tracing::info!(query = %query, hits = results.len(), "claims searched");
                Some(build_search_results(&results))
            }
            ActionKind::Unknown => {
                if !event.text.is_empty() {
                    return Ok(TurnUpdate::text(task, MSG_GUIDANCE));
                }
                None
            }
        };

        match messages {
            Some(list) if !list.is_empty() => Ok(TurnUpdate::ui(task, final_state, list)),
            _ => Ok(TurnUpdate::text(task, MSG_NOTHING)),
        }
    }

    /// Cancellation is not part of this agent's contract.
    pub fn cancel(&self) -> AgentResult<()> {
        Err(AgentError::Unsupported("cancel".to_string()))
    }
}

fn draft_from_fields(fields: ReceiptFields) -> ExpenseDraft {
    ExpenseDraft {
        receipt_name: fields.receipt_name,
        merchant: fields.merchant,
        date: fields.date,
        amount: fields.amount,
        currency: fields.currency,
        category: String::new(),
        payment_method: String::new(),
        memo: String::new(),
    }
}

/// Missing draft fields default to empty strings; submit never fails
/// validation.
fn draft_from_context(event: &ClassifiedEvent) -> ExpenseDraft {
    ExpenseDraft {
        receipt_name: event.str_value("receiptName"),
        merchant: event.str_value("merchant"),
        date: event.str_value("date"),
        amount: event.str_value("amount"),
        currency: event.str_value("currency"),
        category: event.str_value("category"),
        payment_method: event.str_value("paymentMethod"),
        memo: event.str_value("memo"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::testing::{FailingOcr, StaticOcr};
    use crate::storage::MemoryClaimStore;
    use crate::ui::builder::tests::data_contents;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use keihi_llm::LlmError;
    use serde_json::json;

    const RECEIPT_TEXT: &str = "コーヒー店\nReceipt 2024.03.05\nTotal: ¥1,234 Tax: ¥100";

    struct BrokenGenerator;

    #[async_trait]
    impl UiGenerator for BrokenGenerator {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            Ok("sorry, no JSON today".to_string())
        }
    }

    fn agent_with(store: Arc<MemoryClaimStore>) -> ExpenseAgent {
        ExpenseAgent::new(store, Arc::new(StaticOcr(RECEIPT_TEXT)))
    }

    fn data_part(value: Value) -> InboundPart {
        InboundPart::Data(value)
    }

    fn action_request(name: &str, context: Value) -> TurnRequest {
        TurnRequest {
            parts: vec![data_part(json!({
                "userAction": {"actionName": name, "context": context}
            }))],
            ui_supported: true,
            task: None,
        }
    }

    fn upload_request() -> TurnRequest {
        action_request(
            "upload_receipt",
            json!({
                "fileBase64": STANDARD.encode(b"fake png bytes"),
                "fileName": "receipt.png",
                "fileType": "image/png",
            }),
        )
    }

    fn ui_messages(update: &TurnUpdate) -> &[UiMessage] {
        match &update.payload {
            TurnPayload::Ui(messages) => messages,
            TurnPayload::Text(text) => panic!("expected UI payload, got text: {text}"),
        }
    }

    fn text_payload(update: &TurnUpdate) -> &str {
        match &update.payload {
            TurnPayload::Text(text) => text,
            TurnPayload::Ui(_) => panic!("expected text payload"),
        }
    }

    fn entry_value<'a>(messages: &'a [UiMessage], key: &str) -> &'a str {
        data_contents(messages)
            .iter()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value_string.as_deref())
            .unwrap_or_else(|| panic!("entry {key}"))
    }

    #[tokio::test]
    async fn upload_without_payload_terminates_without_touching_the_store() {
        let store = Arc::new(MemoryClaimStore::new());
        let agent = agent_with(Arc::clone(&store));

        let update = agent
            .execute(&action_request("upload_receipt", json!({})))
            .await
            .expect("turn");

        assert_eq!(update.state, TaskState::Completed);
        assert!(update.is_final);
        assert_eq!(text_payload(&update), MSG_UPLOAD_MISSING);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn upload_renders_the_form_and_stays_non_terminal() {
        let store = Arc::new(MemoryClaimStore::new());
        let agent = agent_with(Arc::clone(&store));

        let update = agent.execute(&upload_request()).await.expect("turn");

        assert_eq!(update.state, TaskState::InputRequired);
        assert!(!update.is_final);
        let messages = ui_messages(&update);
        assert_eq!(messages[0].surface_id(), "expense-form");
        assert_eq!(entry_value(messages, "receiptName"), "receipt.png");
        assert_eq!(entry_value(messages, "merchant"), "コーヒー店");
        assert_eq!(entry_value(messages, "date"), "2024/03/05");
        assert_eq!(entry_value(messages, "amount"), "1234.00");
        assert_eq!(entry_value(messages, "currency"), "JPY");
        assert_eq!(entry_value(messages, "category"), "");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn upload_with_generator_renders_the_review_surface() {
        let store = Arc::new(MemoryClaimStore::new());
        let agent = agent_with(store).with_generator(Arc::new(BrokenGenerator));

        let update = agent.execute(&upload_request()).await.expect("turn");

        assert_eq!(update.state, TaskState::InputRequired);
        let messages = ui_messages(&update);
        assert_eq!(messages[0].surface_id(), "expense-review");
    }

    #[tokio::test]
    async fn submit_appends_one_record_and_terminates() {
        let store = Arc::new(MemoryClaimStore::new());
        let agent = agent_with(Arc::clone(&store));

        let update = agent
            .execute(&action_request(
                "submit_expense",
                json!({
                    "receiptName": "receipt.png",
                    "merchant": "コーヒー店",
                    "date": "2024/03/05",
                    "amount": "1234.00",
                    "currency": "JPY",
                    "category": "会議費",
                    "paymentMethod": "現金",
                    "memo": "打ち合わせ",
                }),
            ))
            .await
            .expect("turn");

        assert_eq!(update.state, TaskState::Completed);
        assert!(update.is_final);
        assert_eq!(store.len().await, 1);

        let stored = &store.search("").await.expect("search")[0];
        assert_eq!(stored.draft.merchant, "コーヒー店");

        let messages = ui_messages(&update);
        assert_eq!(messages[0].surface_id(), "expense-confirm");
        assert_eq!(entry_value(messages, "merchant"), "コーヒー店");
        assert_eq!(entry_value(messages, "amountDisplay"), "1234.00 JPY");
    }

    #[tokio::test]
    async fn submit_defaults_missing_fields_to_empty() {
        let store = Arc::new(MemoryClaimStore::new());
        let agent = agent_with(Arc::clone(&store));

        agent
            .execute(&action_request(
                "submit_expense",
                json!({"merchant": "コーヒー店"}),
            ))
            .await
            .expect("turn");

        let stored = &store.search("").await.expect("search")[0];
        assert_eq!(stored.draft.merchant, "コーヒー店");
        assert_eq!(stored.draft.date, "");
        assert_eq!(stored.draft.memo, "");
    }

    #[tokio::test]
    async fn search_returns_matching_claims_non_terminal() {
        let store = Arc::new(MemoryClaimStore::new());
        store
            .append(ExpenseDraft {
                merchant: "Coffee Shop".to_string(),
                ..ExpenseDraft::default()
            })
            .await
            .expect("append");
        store
            .append(ExpenseDraft {
                merchant: "Bookstore".to_string(),
                ..ExpenseDraft::default()
            })
            .await
            .expect("append");
        let agent = agent_with(Arc::clone(&store));

        let update = agent
            .execute(&action_request("search_expense", json!({"query": "coffee"})))
            .await
            .expect("turn");

        assert_eq!(update.state, TaskState::InputRequired);
        assert!(!update.is_final);
        let messages = ui_messages(&update);
        assert_eq!(messages[0].surface_id(), "expense-search");
        let items = data_contents(messages)
            .iter()
            .find(|entry| entry.key == "items")
            .and_then(|entry| entry.value_map.as_ref())
            .expect("items");
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn search_without_query_returns_everything() {
        let store = Arc::new(MemoryClaimStore::new());
        for merchant in ["a", "b"] {
            store
                .append(ExpenseDraft {
                    merchant: merchant.to_string(),
                    ..ExpenseDraft::default()
                })
                .await
                .expect("append");
        }
        let agent = agent_with(Arc::clone(&store));

        let update = agent
            .execute(&action_request("search_expense", json!({})))
            .await
            .expect("turn");
        let items = data_contents(ui_messages(&update))
            .iter()
            .find(|entry| entry.key == "items")
            .and_then(|entry| entry.value_map.as_ref())
            .expect("items");
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn free_text_gets_terminal_guidance() {
        let agent = agent_with(Arc::new(MemoryClaimStore::new()));
        let request = TurnRequest {
            parts: vec![InboundPart::Text("経費を申請したい".to_string())],
            ui_supported: true,
            task: None,
        };
        let update = agent.execute(&request).await.expect("turn");
        assert!(update.is_final);
        assert_eq!(text_payload(&update), MSG_GUIDANCE);
    }

    #[tokio::test]
    async fn empty_request_is_nothing_to_process() {
        let agent = agent_with(Arc::new(MemoryClaimStore::new()));
        let request = TurnRequest {
            parts: Vec::new(),
            ui_supported: true,
            task: None,
        };
        let update = agent.execute(&request).await.expect("turn");
        assert!(update.is_final);
        assert_eq!(text_payload(&update), MSG_NOTHING);
    }

    #[tokio::test]
    async fn client_without_ui_support_gets_a_plain_notice() {
        let agent = agent_with(Arc::new(MemoryClaimStore::new()));
        let request = TurnRequest {
            parts: vec![data_part(json!({"actionName": "search_expense"}))],
            ui_supported: false,
            task: None,
        };
        let update = agent.execute(&request).await.expect("turn");
        assert_eq!(update.state, TaskState::Completed);
        assert_eq!(text_payload(&update), MSG_UI_REQUIRED);
    }

    #[tokio::test]
    async fn ocr_failure_terminates_with_a_message_not_an_error() {
        let store = Arc::new(MemoryClaimStore::new());
        let agent = ExpenseAgent::new(Arc::clone(&store) as Arc<dyn ClaimStore>, Arc::new(FailingOcr));

        let update = agent.execute(&upload_request()).await.expect("turn");
        assert!(update.is_final);
        assert!(text_payload(&update).contains("領収書を処理できませんでした"));
        assert!(store.is_empty().await);
    }

    #[test]
    fn cancel_is_unconditionally_unsupported() {
        let agent = agent_with(Arc::new(MemoryClaimStore::new()));
        let err = agent.cancel().expect_err("unsupported");
        assert!(matches!(err, AgentError::Unsupported(_)));
    }

    #[test]
    fn classification_prefers_the_user_action_envelope() {
        let event = classify_parts(&[data_part(json!({
            "userAction": {"name": "upload_receipt", "context": {"fileName": "a.png"}},
            "actionName": "search_expense",
        }))]);
        assert_eq!(event.kind(), ActionKind::UploadReceipt);
        assert_eq!(event.str_value("fileName"), "a.png");
    }

    #[test]
    fn classification_reads_top_level_synonyms() {
        let by_action_name =
            classify_parts(&[data_part(json!({"actionName": "search_expense"}))]);
        assert_eq!(by_action_name.kind(), ActionKind::SearchExpense);

        let by_action = classify_parts(&[data_part(json!({"action": "submit_expense"}))]);
        assert_eq!(by_action.kind(), ActionKind::SubmitExpense);

        // `name` is an envelope-only synonym.
        let by_name = classify_parts(&[data_part(json!({"name": "submit_expense"}))]);
        assert_eq!(by_name.kind(), ActionKind::Unknown);
    }

    #[test]
    fn later_data_parts_override_earlier_ones() {
        let event = classify_parts(&[
            data_part(json!({"actionName": "search_expense"})),
            data_part(json!({"userAction": {"action": "submit_expense"}})),
        ]);
        assert_eq!(event.kind(), ActionKind::SubmitExpense);
    }

    #[test]
    fn turn_update_serializes_with_a_final_flag() {
        let task = InteractionTask {
            id: "task-1".to_string(),
            context_id: "ctx-1".to_string(),
        };
        let update = TurnUpdate::text(task, "done");
        let value = serde_json::to_value(&update).expect("serialize");
        assert_eq!(
            value,
            json!({
                "task": {"id": "task-1", "contextId": "ctx-1"},
                "state": "completed",
                "final": true,
                "payload": {"text": "done"}
            })
        );
    }

    #[tokio::test]
    async fn a_fresh_task_is_created_when_none_is_attached() {
        let agent = agent_with(Arc::new(MemoryClaimStore::new()));
        let update = agent.execute(&upload_request()).await.expect("turn");
        assert!(!update.task.id.is_empty());
        assert!(!update.task.context_id.is_empty());
    }

    #[tokio::test]
    async fn an_attached_task_is_continued() {
        let agent = agent_with(Arc::new(MemoryClaimStore::new()));
        let task = InteractionTask {
            id: "task-7".to_string(),
            context_id: "ctx-7".to_string(),
        };
        let request = TurnRequest {
            task: Some(task.clone()),
            ..upload_request()
        };
        let update = agent.execute(&request).await.expect("turn");
        assert_eq!(update.task, task);
    }
}
