//! Deterministic surface builders.
//!
//! The screens differ only in which fields they show and in what
//! order, so one field table drives all of them.

use crate::protocol::{
    ActionBinding, BeginRendering, BoundValue, ButtonComponent, CardComponent, Children,
    ColumnComponent, Component, ComponentInstance, DataEntry, DataModelUpdate, ListComponent,
    ListTemplate, SurfaceStyles, SurfaceUpdate, TextComponent, TextFieldComponent, TextFieldKind,
    UiMessage, UserAction,
};
use crate::storage::{ClaimRecord, ExpenseDraft};

pub(crate) const SUBMIT_ACTION: &str = "submit_expense";
pub(crate) const BACK_ACTION: &str = "back_to_top";

const PRIMARY_COLOR: &str = "#2F5AFF";
const FONT: &str = "Roboto";

/// The eight draft fields, in protocol order.
pub(crate) const DRAFT_KEYS: [&str; 8] = [
    "receiptName",
    "merchant",
    "date",
    "amount",
    "currency",
    "category",
    "paymentMethod",
    "memo",
];

pub(crate) struct FormField {
    pub key: &'static str,
    pub id: &'static str,
    pub label: &'static str,
    pub kind: TextFieldKind,
}

/// Editable fields of the draft surfaces, in render order. The receipt
/// name renders separately as read-only text.
pub(crate) const EDITABLE_FIELDS: [FormField; 7] = [
    FormField {
        key: "merchant",
        id: "merchant-field",
        label: "支払先",
        kind: TextFieldKind::ShortText,
    },
    FormField {
        key: "date",
        id: "date-field",
        label: "日付",
        kind: TextFieldKind::Date,
    },
    FormField {
        key: "amount",
        id: "amount-field",
        label: "金額",
        kind: TextFieldKind::Number,
    },
    FormField {
        key: "currency",
        id: "currency-field",
        label: "通貨",
        kind: TextFieldKind::ShortText,
    },
    FormField {
        key: "category",
        id: "category-field",
        label: "カテゴリ",
        kind: TextFieldKind::ShortText,
    },
    FormField {
        key: "paymentMethod",
        id: "payment-field",
        label: "支払方法",
        kind: TextFieldKind::ShortText,
    },
    FormField {
        key: "memo",
        id: "memo-field",
        label: "備考",
        kind: TextFieldKind::LongText,
    },
];

/// Identity of a draft-editing surface; the form and the review
/// fallback share the same component set under different surfaces.
pub(crate) struct DraftSurface {
    pub surface_id: &'static str,
    pub root_id: &'static str,
    pub title_id: &'static str,
    pub title: &'static str,
}

pub(crate) const FORM_SURFACE: DraftSurface = DraftSurface {
    surface_id: "expense-form",
    root_id: "expense-root",
    title_id: "form-title",
    title: "経費申請フォーム",
};

const CONFIRM_SURFACE: &str = "expense-confirm";
const SEARCH_SURFACE: &str = "expense-search";

/// Confirmation rows: component id and the data-model path it shows.
const CONFIRM_FIELDS: [(&str, &str); 7] = [
    ("confirm-receipt", "receiptName"),
    ("confirm-merchant", "merchant"),
    ("confirm-date", "date"),
    ("confirm-amount", "amountDisplay"),
    ("confirm-category", "category"),
    ("confirm-payment", "paymentMethod"),
    ("confirm-memo", "memo"),
];

/// Search result item rows, stamped per record via the list template.
const RESULT_FIELDS: [(&str, &str); 6] = [
    ("result-merchant", "merchant"),
    ("result-date", "date"),
    ("result-amount", "amountDisplay"),
    ("result-category", "category"),
    ("result-memo", "memo"),
    ("result-receipt", "receiptName"),
];

fn styles() -> SurfaceStyles {
    SurfaceStyles {
        primary_color: PRIMARY_COLOR.to_string(),
        font: FONT.to_string(),
    }
}

fn begin(surface_id: &str, root: &str) -> UiMessage {
    UiMessage::BeginRendering(BeginRendering {
        surface_id: surface_id.to_string(),
        root: root.to_string(),
        styles: Some(styles()),
    })
}

fn component(id: &str, component: Component) -> ComponentInstance {
    ComponentInstance {
        id: id.to_string(),
        component,
    }
}

fn column(id: &str, children: &[&str]) -> ComponentInstance {
    component(
        id,
        Component::Column(ColumnComponent {
            children: Children::ExplicitList(children.iter().map(|c| c.to_string()).collect()),
        }),
    )
}

fn heading(id: &str, text: &str) -> ComponentInstance {
    component(
        id,
        Component::Text(TextComponent {
            usage_hint: Some("h2".to_string()),
            text: BoundValue::literal(text),
        }),
    )
}

fn literal_text(id: &str, text: &str) -> ComponentInstance {
    component(
        id,
        Component::Text(TextComponent {
            usage_hint: None,
            text: BoundValue::literal(text),
        }),
    )
}

fn path_text(id: &str, path: &str) -> ComponentInstance {
    component(
        id,
        Component::Text(TextComponent {
            usage_hint: None,
            text: BoundValue::path(path),
        }),
    )
}

fn text_field(field: &FormField) -> ComponentInstance {
    component(
        field.id,
        Component::TextField(TextFieldComponent {
            label: BoundValue::literal(field.label),
            text: BoundValue::path(field.key),
            text_field_type: field.kind,
        }),
    )
}

/// The submit action, binding all eight fields to their live data-model
/// paths so edits are captured at submit time rather than at render.
pub(crate) fn submit_action() -> UserAction {
    UserAction {
        name: SUBMIT_ACTION.to_string(),
        context: DRAFT_KEYS
            .iter()
            .map(|key| ActionBinding {
                key: key.to_string(),
                value: BoundValue::path(*key),
            })
            .collect(),
    }
}

pub(crate) fn submit_button() -> [ComponentInstance; 2] {
    [
        component(
            "submit-button",
            Component::Button(ButtonComponent {
                child: "submit-button-text".to_string(),
                primary: Some(true),
                action: submit_action(),
            }),
        ),
        literal_text("submit-button-text", "申請する"),
    ]
}

/// The eight data-model entries for a draft; unset fields stay empty
/// strings, currency defaults to JPY.
pub(crate) fn draft_entries(draft: &ExpenseDraft) -> Vec<DataEntry> {
    let currency = if draft.currency.is_empty() {
        "JPY"
    } else {
        draft.currency.as_str()
    };
    vec![
        DataEntry::string("receiptName", &draft.receipt_name),
        DataEntry::string("merchant", &draft.merchant),
        DataEntry::string("date", &draft.date),
        DataEntry::string("amount", &draft.amount),
        DataEntry::string("currency", currency),
        DataEntry::string("category", &draft.category),
        DataEntry::string("paymentMethod", &draft.payment_method),
        DataEntry::string("memo", &draft.memo),
    ]
}

fn amount_display(record: &ClaimRecord) -> String {
    format!("{} {}", record.draft.amount, record.draft.currency)
}

/// Build the full message sequence for a draft-editing surface.
pub(crate) fn build_draft_surface(
    surface: &DraftSurface,
    draft: &ExpenseDraft,
) -> Vec<UiMessage> {
    let mut order: Vec<&str> = vec![surface.title_id, "receipt-name"];
    order.extend(EDITABLE_FIELDS.iter().map(|field| field.id));
    order.push("submit-button");

    let mut components = vec![
        column(surface.root_id, &order),
        heading(surface.title_id, surface.title),
        path_text("receipt-name", "receiptName"),
    ];
    components.extend(EDITABLE_FIELDS.iter().map(text_field));
    components.extend(submit_button());

    vec![
        begin(surface.surface_id, surface.root_id),
        UiMessage::SurfaceUpdate(SurfaceUpdate {
            surface_id: surface.surface_id.to_string(),
            components,
        }),
        UiMessage::DataModelUpdate(DataModelUpdate {
            surface_id: surface.surface_id.to_string(),
            path: "/".to_string(),
            contents: draft_entries(draft),
        }),
    ]
}

/// The expense entry form shown after a receipt upload.
pub fn build_expense_form(draft: &ExpenseDraft) -> Vec<UiMessage> {
    build_draft_surface(&FORM_SURFACE, draft)
}

/// The read-only confirmation shown after a successful submit.
pub fn build_confirmation(record: &ClaimRecord) -> Vec<UiMessage> {
    let mut order: Vec<&str> = vec!["confirm-title"];
    order.extend(CONFIRM_FIELDS.iter().map(|(id, _)| *id));
    order.push("confirm-back");

    let mut components = vec![
        component(
            "confirm-card",
            Component::Card(CardComponent {
                child: "confirm-column".to_string(),
            }),
        ),
        column("confirm-column", &order),
        heading("confirm-title", "申請が完了しました"),
    ];
    components.extend(
        CONFIRM_FIELDS
            .iter()
            .map(|(id, path)| path_text(id, path)),
    );
    components.push(component(
        "confirm-back",
        Component::Button(ButtonComponent {
            child: "confirm-back-text".to_string(),
            primary: None,
            action: UserAction {
                name: BACK_ACTION.to_string(),
                context: Vec::new(),
            },
        }),
    ));
    components.push(literal_text("confirm-back-text", "TOPに戻る"));

    let draft = &record.draft;
    let contents = vec![
        DataEntry::string("receiptName", &draft.receipt_name),
        DataEntry::string("merchant", &draft.merchant),
        DataEntry::string("date", &draft.date),
        DataEntry::string("amountDisplay", amount_display(record)),
        DataEntry::string("category", &draft.category),
        DataEntry::string("paymentMethod", &draft.payment_method),
        DataEntry::string("memo", &draft.memo),
    ];

    vec![
        begin(CONFIRM_SURFACE, "confirm-card"),
        UiMessage::SurfaceUpdate(SurfaceUpdate {
            surface_id: CONFIRM_SURFACE.to_string(),
            components,
        }),
        UiMessage::DataModelUpdate(DataModelUpdate {
            surface_id: CONFIRM_SURFACE.to_string(),
            path: "/".to_string(),
            contents,
        }),
    ]
}

/// The search results list: one item template stamped per record.
pub fn build_search_results(records: &[ClaimRecord]) -> Vec<UiMessage> {
    let items: Vec<DataEntry> = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            DataEntry::map(
                format!("item{}", index + 1),
                vec![
                    DataEntry::string("merchant", &record.draft.merchant),
                    DataEntry::string("date", &record.draft.date),
                    DataEntry::string("amountDisplay", amount_display(record)),
                    DataEntry::string("category", &record.draft.category),
                    DataEntry::string("memo", &record.draft.memo),
                    DataEntry::string("receiptName", &record.draft.receipt_name),
                ],
            )
        })
        .collect();

    let item_order: Vec<&str> = RESULT_FIELDS.iter().map(|(id, _)| *id).collect();
    let mut components = vec![
        column("results-root", &["results-title", "results-list"]),
        heading("results-title", "検索結果"),
        component(
            "results-list",
            Component::List(ListComponent {
                direction: "vertical".to_string(),
                children: Children::Template(ListTemplate {
                    data_binding: "/items".to_string(),
                    component_id: "result-card-template".to_string(),
                }),
            }),
        ),
        component(
            "result-card-template",
            Component::Card(CardComponent {
                child: "result-card-column".to_string(),
            }),
        ),
        column("result-card-column", &item_order),
    ];
    components.extend(
        RESULT_FIELDS
            .iter()
            .map(|(id, path)| path_text(id, path)),
    );

    vec![
        begin(SEARCH_SURFACE, "results-root"),
        UiMessage::SurfaceUpdate(SurfaceUpdate {
            surface_id: SEARCH_SURFACE.to_string(),
            components,
        }),
        UiMessage::DataModelUpdate(DataModelUpdate {
            surface_id: SEARCH_SURFACE.to_string(),
            path: "/".to_string(),
            contents: vec![DataEntry::map("items", items)],
        }),
    ]
}
