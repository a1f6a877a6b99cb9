//! Declarative UI wire protocol.
//!
//! One screen is described by an ordered sequence of [`UiMessage`]s:
//! a `beginRendering` naming the surface and its root component, one or
//! more `surfaceUpdate`s defining the component tree, and
//! `dataModelUpdate`s seeding the surface's data model. Field names are
//! wire-exact for the external renderer, so every type here pins its
//! serialized form.

use serde::{Deserialize, Serialize};

/// A single message in a screen description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UiMessage {
    #[serde(rename = "beginRendering")]
    BeginRendering(BeginRendering),
    #[serde(rename = "surfaceUpdate")]
    SurfaceUpdate(SurfaceUpdate),
    #[serde(rename = "dataModelUpdate")]
    DataModelUpdate(DataModelUpdate),
}

impl UiMessage {
    /// The surface this message addresses.
    pub fn surface_id(&self) -> &str {
        match self {
            UiMessage::BeginRendering(msg) => &msg.surface_id,
            UiMessage::SurfaceUpdate(msg) => &msg.surface_id,
            UiMessage::DataModelUpdate(msg) => &msg.surface_id,
        }
    }
}

/// Opens a surface and names its root component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginRendering {
    pub surface_id: String,
    pub root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<SurfaceStyles>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceStyles {
    pub primary_color: String,
    pub font: String,
}

/// Defines or replaces components on a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceUpdate {
    pub surface_id: String,
    pub components: Vec<ComponentInstance>,
}

/// Seeds or patches a surface's data model at `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModelUpdate {
    pub surface_id: String,
    pub path: String,
    pub contents: Vec<DataEntry>,
}

/// A component definition paired with its surface-unique id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInstance {
    pub id: String,
    pub component: Component,
}

/// The component vocabulary the renderer understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Component {
    Column(ColumnComponent),
    Text(TextComponent),
    TextField(TextFieldComponent),
    Button(ButtonComponent),
    Card(CardComponent),
    List(ListComponent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnComponent {
    pub children: Children,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextComponent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_hint: Option<String>,
    pub text: BoundValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFieldComponent {
    pub label: BoundValue,
    pub text: BoundValue,
    pub text_field_type: TextFieldKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextFieldKind {
    ShortText,
    LongText,
    Date,
    Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonComponent {
    /// Component id of the button label.
    pub child: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    pub action: UserAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardComponent {
    pub child: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListComponent {
    pub direction: String,
    pub children: Children,
}

/// Child wiring: a fixed ordering, or one template stamped per item of
/// a bound data-model array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Children {
    #[serde(rename = "explicitList")]
    ExplicitList(Vec<String>),
    #[serde(rename = "template")]
    Template(ListTemplate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTemplate {
    pub data_binding: String,
    pub component_id: String,
}

/// A literal or a data-model reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundValue {
    #[serde(rename = "literalString")]
    Literal(String),
    #[serde(rename = "path")]
    Path(String),
}

impl BoundValue {
    pub fn literal(value: impl Into<String>) -> Self {
        BoundValue::Literal(value.into())
    }

    pub fn path(value: impl Into<String>) -> Self {
        BoundValue::Path(value.into())
    }
}

/// A named action raised by the client, carrying bound context values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ActionBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBinding {
    pub key: String,
    pub value: BoundValue,
}

/// One entry of a data model: a string value or a nested map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    pub key: String,
    #[serde(
        rename = "valueString",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_string: Option<String>,
    #[serde(rename = "valueMap", default, skip_serializing_if = "Option::is_none")]
    pub value_map: Option<Vec<DataEntry>>,
}

impl DataEntry {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value_string: Some(value.into()),
            value_map: None,
        }
    }

    pub fn map(key: impl Into<String>, entries: Vec<DataEntry>) -> Self {
        Self {
            key: key.into(),
            value_string: None,
            value_map: Some(entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn begin_rendering_uses_wire_names() {
        let message = UiMessage::BeginRendering(BeginRendering {
            surface_id: "expense-form".to_string(),
            root: "expense-root".to_string(),
            styles: Some(SurfaceStyles {
                primary_color: "#2F5AFF".to_string(),
                font: "Roboto".to_string(),
            }),
        });
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            value,
            json!({
                "beginRendering": {
                    "surfaceId": "expense-form",
                    "root": "expense-root",
                    "styles": {"primaryColor": "#2F5AFF", "font": "Roboto"}
                }
            })
        );
    }

    #[test]
    fn surface_update_components_round_trip() {
        let message = UiMessage::SurfaceUpdate(SurfaceUpdate {
            surface_id: "expense-form".to_string(),
            components: vec![
                ComponentInstance {
                    id: "expense-root".to_string(),
                    component: Component::Column(ColumnComponent {
                        children: Children::ExplicitList(vec!["merchant-field".to_string()]),
                    }),
                },
                ComponentInstance {
                    id: "merchant-field".to_string(),
                    component: Component::TextField(TextFieldComponent {
                        label: BoundValue::literal("支払先"),
                        text: BoundValue::path("merchant"),
                        text_field_type: TextFieldKind::ShortText,
                    }),
                },
            ],
        });

        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            value,
            json!({
                "surfaceUpdate": {
                    "surfaceId": "expense-form",
                    "components": [
                        {
                            "id": "expense-root",
                            "component": {"Column": {"children": {"explicitList": ["merchant-field"]}}}
                        },
                        {
                            "id": "merchant-field",
                            "component": {"TextField": {
                                "label": {"literalString": "支払先"},
                                "text": {"path": "merchant"},
                                "textFieldType": "shortText"
                            }}
                        }
                    ]
                }
            })
        );

        let back: UiMessage = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, message);
    }

    #[test]
    fn data_model_update_string_and_map_entries() {
        let message = UiMessage::DataModelUpdate(DataModelUpdate {
            surface_id: "expense-search".to_string(),
            path: "/".to_string(),
            contents: vec![DataEntry::map(
                "items",
                vec![DataEntry::map(
                    "item1",
                    vec![DataEntry::string("merchant", "コーヒー店")],
                )],
            )],
        });
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            value,
            json!({
                "dataModelUpdate": {
                    "surfaceId": "expense-search",
                    "path": "/",
                    "contents": [
                        {"key": "items", "valueMap": [
                            {"key": "item1", "valueMap": [
                                {"key": "merchant", "valueString": "コーヒー店"}
                            ]}
                        ]}
                    ]
                }
            })
        );
    }

    #[test]
    fn button_action_bindings_serialize_by_path() {
        let button = Component::Button(ButtonComponent {
            child: "submit-button-text".to_string(),
            primary: Some(true),
            action: UserAction {
                name: "submit_expense".to_string(),
                context: vec![ActionBinding {
                    key: "merchant".to_string(),
                    value: BoundValue::path("merchant"),
                }],
            },
        });
        let value = serde_json::to_value(&button).expect("serialize");
        assert_eq!(
            value,
            json!({
                "Button": {
                    "child": "submit-button-text",
                    "primary": true,
                    "action": {
                        "name": "submit_expense",
                        "context": [{"key": "merchant", "value": {"path": "merchant"}}]
                    }
                }
            })
        );
    }

    #[test]
    fn unknown_struct_fields_are_tolerated_on_input() {
        let raw = json!({
            "beginRendering": {
                "surfaceId": "expense-review",
                "root": "review-root",
                "extra": "ignored"
            }
        });
        let message: UiMessage = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(message.surface_id(), "expense-review");
    }
}
