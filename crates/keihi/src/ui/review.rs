//! Generative review surface.
//!
//! An external model may author the review screen, but correctness never
//! depends on it: the raw output goes through a repair pass (fence
//! stripping, bracket-span extraction, parse, shape check) and, when it
//! survives, a structural completion pass that appends every component,
//! ordering entry and data-model field the deterministic fallback would
//! have produced. Anything else falls back to the deterministic builder.

use keihi_llm::UiGenerator;

use crate::protocol::{
    ButtonComponent, Children, ColumnComponent, Component, ComponentInstance, DataModelUpdate,
    ListComponent, SurfaceUpdate, UiMessage,
};
use crate::storage::ExpenseDraft;
use crate::ui::builder::{
    build_draft_surface, draft_entries, submit_action, DraftSurface, SUBMIT_ACTION,
};

pub(crate) const REVIEW_SURFACE: DraftSurface = DraftSurface {
    surface_id: "expense-review",
    root_id: "review-root",
    title_id: "review-title",
    title: "申請内容の確認",
};

/// The deterministic review screen, also the source of the required
/// component set for the completion pass.
pub fn build_review_fallback(draft: &ExpenseDraft) -> Vec<UiMessage> {
    build_draft_surface(&REVIEW_SURFACE, draft)
}

fn review_prompt(draft: &ExpenseDraft) -> (String, String) {
    let draft_json =
        serde_json::to_string_pretty(draft).unwrap_or_else(|_| "{}".to_string());
    let system = [
        "You author screens for a declarative UI renderer.",
        "Respond with a single JSON array of UI messages and nothing else.",
        "Rules:",
        "- The first message must be {\"beginRendering\": {\"surfaceId\": \"expense-review\", \"root\": \"review-root\"}}.",
        "- Add one {\"surfaceUpdate\": ...} defining the component tree, and one {\"dataModelUpdate\": ...} with path \"/\".",
        "- Available components: Column, Text, TextField, Button, Card, List.",
        "- Show every draft field as a TextField bound to its data-model path: receiptName, merchant, date, amount, currency, category, paymentMethod, memo.",
        "- Include a primary Button whose action is named \"submit_expense\" and whose context binds all eight fields by path.",
        "- The dataModelUpdate must seed all eight fields.",
    ]
    .join("\n");
    let user = format!("Create a review screen for this expense draft:\n{draft_json}");
    (system, user)
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        let body = body.trim_end();
        return body.strip_suffix("```").map(str::trim_end).unwrap_or(body);
    }
    trimmed
}

fn bracket_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end >= start).then(|| &text[start..=end])
}

/// Try to recover a usable message sequence from raw model output.
/// `None` means the fallback must be used.
pub fn repair_response(raw: &str) -> Option<Vec<UiMessage>> {
    let span = bracket_span(strip_code_fences(raw))?;
    let messages: Vec<UiMessage> = serde_json::from_str(span).ok()?;
    if !messages
        .iter()
        .any(|message| matches!(message, UiMessage::BeginRendering(_)))
    {
        return None;
    }
    Some(messages)
}

/// The fallback decision, separated from the network call so it can be
/// exercised without one.
pub fn is_valid_response(raw: &str) -> bool {
    repair_response(raw).is_some()
}

/// Append whatever required structure the model omitted: components,
/// root ordering entries and data-model fields. Extras are never removed.
pub(crate) fn complete_review_messages(messages: &mut Vec<UiMessage>, draft: &ExpenseDraft) {
    let fallback = build_review_fallback(draft);
    let required: Vec<ComponentInstance> = fallback
        .iter()
        .find_map(|message| match message {
            UiMessage::SurfaceUpdate(update) => Some(update.components.clone()),
            _ => None,
        })
        .unwrap_or_default();
    let mut required_order: Vec<String> = required
        .iter()
        .find_map(|instance| match &instance.component {
            Component::Column(ColumnComponent {
                children: Children::ExplicitList(children),
            }) if instance.id == REVIEW_SURFACE.root_id => Some(children.clone()),
            _ => None,
        })
        .unwrap_or_default();

    ensure_components(messages, &required);
    if let Some(extra_id) = ensure_submit_button(messages, &required) {
        required_order.push(extra_id);
    }
    ensure_root_order(messages, &required_order);
    ensure_data_model(messages, draft);
}

fn review_update_indices(messages: &[UiMessage]) -> Vec<usize> {
    messages
        .iter()
        .enumerate()
        .filter_map(|(index, message)| match message {
            UiMessage::SurfaceUpdate(update) if update.surface_id == REVIEW_SURFACE.surface_id => {
                Some(index)
            }
            _ => None,
        })
        .collect()
}

fn defined_ids(messages: &[UiMessage]) -> Vec<String> {
    review_update_indices(messages)
        .into_iter()
        .flat_map(|index| match &messages[index] {
            UiMessage::SurfaceUpdate(update) => update
                .components
                .iter()
                .map(|instance| instance.id.clone())
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        })
        .collect()
}

fn ensure_components(messages: &mut Vec<UiMessage>, required: &[ComponentInstance]) {
    let target = match review_update_indices(messages).last() {
        Some(&index) => index,
        None => {
            messages.push(UiMessage::SurfaceUpdate(SurfaceUpdate {
                surface_id: REVIEW_SURFACE.surface_id.to_string(),
                components: Vec::new(),
            }));
            messages.len() - 1
        }
    };

    let defined = defined_ids(messages);
    let missing: Vec<ComponentInstance> = required
        .iter()
        .filter(|instance| !defined.contains(&instance.id))
        .cloned()
        .collect();
    if let UiMessage::SurfaceUpdate(update) = &mut messages[target] {
        update.components.extend(missing);
    }
}

/// Guarantee a `submit_expense` button exists even when the model reused
/// the fallback's id for something else. Returns the id of a freshly
/// appended button so it can be added to the root ordering.
fn ensure_submit_button(
    messages: &mut Vec<UiMessage>,
    required: &[ComponentInstance],
) -> Option<String> {
    let has_submit = review_update_indices(messages).iter().any(|&index| {
        let UiMessage::SurfaceUpdate(update) = &messages[index] else {
            return false;
        };
        update.components.iter().any(|instance| {
            matches!(
                &instance.component,
                Component::Button(button) if button.action.name == SUBMIT_ACTION
            )
        })
    });
    if has_submit {
        return None;
    }

    let label_child = required
        .iter()
        .find_map(|instance| match &instance.component {
            Component::Button(button) if button.action.name == SUBMIT_ACTION => {
                Some(button.child.clone())
            }
            _ => None,
        })
        .unwrap_or_else(|| "submit-button-text".to_string());
    let id = "review-submit-button".to_string();
    let button = ComponentInstance {
        id: id.clone(),
        component: Component::Button(ButtonComponent {
            child: label_child,
            primary: Some(true),
            action: submit_action(),
        }),
    };
    if let Some(&index) = review_update_indices(messages).last() {
        if let UiMessage::SurfaceUpdate(update) = &mut messages[index] {
            update.components.push(button);
        }
    }
    Some(id)
}

fn ensure_root_order(messages: &mut Vec<UiMessage>, required_order: &[String]) {
    let defined = defined_ids(messages);
    let root = messages
        .iter_mut()
        .find_map(|message| match message {
            UiMessage::BeginRendering(begin)
                if begin.surface_id == REVIEW_SURFACE.surface_id =>
            {
                Some(begin)
            }
            _ => None,
        });
    let Some(begin) = root else { return };
    if !defined.contains(&begin.root) {
        begin.root = REVIEW_SURFACE.root_id.to_string();
    }
    let root_id = begin.root.clone();

    for index in review_update_indices(messages) {
        let UiMessage::SurfaceUpdate(update) = &mut messages[index] else {
            continue;
        };
        for instance in &mut update.components {
            if instance.id != root_id {
                continue;
            }
            let children = match &mut instance.component {
                Component::Column(ColumnComponent {
                    children: Children::ExplicitList(children),
                })
                | Component::List(ListComponent {
                    children: Children::ExplicitList(children),
                    ..
                }) => children,
                _ => continue,
            };
            for id in required_order {
                if !children.contains(id) {
                    children.push(id.clone());
                }
            }
            return;
        }
    }
}

fn ensure_data_model(messages: &mut Vec<UiMessage>, draft: &ExpenseDraft) {
    let full = draft_entries(draft);
    let existing = messages.iter_mut().find_map(|message| match message {
        UiMessage::DataModelUpdate(update) if update.surface_id == REVIEW_SURFACE.surface_id => {
            Some(update)
        }
        _ => None,
    });
    match existing {
        Some(update) => {
            if update.contents.is_empty() {
                update.contents = full;
                return;
            }
            for entry in full {
                if !update.contents.iter().any(|present| present.key == entry.key) {
                    update.contents.push(entry);
                }
            }
        }
        None => messages.push(UiMessage::DataModelUpdate(DataModelUpdate {
            surface_id: REVIEW_SURFACE.surface_id.to_string(),
            path: "/".to_string(),
            contents: full,
        })),
    }
}

/// Author the review screen generatively, falling back to the
/// deterministic builder on any malformed output or call failure.
pub async fn build_review_ui(generator: &dyn UiGenerator, draft: &ExpenseDraft) -> Vec<UiMessage> {
    let (system, user) = review_prompt(draft);
    match generator.generate(&system, &user).await {
        Ok(raw) => match repair_response(&raw) {
            Some(mut messages) => {
                complete_review_messages(&mut messages, draft);
                messages
            }
            None => {
                tracing::warn!("generative review output rejected; using fallback");
                build_review_fallback(draft)
            }
        },
        Err(error) => {
            tracing::warn!(%error, "generative review call failed; using fallback");
            build_review_fallback(draft)
        }
    }
}
