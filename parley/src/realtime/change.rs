use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Row operation reported by the realtime service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// A committed row change delivered on a channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    #[serde(rename = "type", alias = "eventType")]
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    #[serde(default, alias = "new")]
    pub record: Value,
    #[serde(default, alias = "old")]
    pub old_record: Value,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    /// Decode a `postgres_changes` payload, which wraps the change under `data`
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let data = payload.get("data").unwrap_or(payload);
        serde_json::from_value(data.clone()).ok()
    }

    /// Row the change is about: the new row, or the old one for deletes
    pub fn row(&self) -> &Value {
        match self.kind {
            ChangeKind::Delete => &self.old_record,
            _ => &self.record,
        }
    }
}

/// Which changes a channel asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    /// `None` means every kind
    pub event: Option<ChangeKind>,
    pub schema: String,
    pub table: String,
    /// `column=eq.value` restriction
    pub predicate: Option<(String, String)>,
}

impl ChangeFilter {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            event: None,
            schema: "public".to_string(),
            table: table.into(),
            predicate: None,
        }
    }

    pub fn on(mut self, kind: ChangeKind) -> Self {
        self.event = Some(kind);
        self
    }

    pub fn column_eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicate = Some((column.into(), value.into()));
        self
    }

    pub fn filter_string(&self) -> Option<String> {
        self.predicate
            .as_ref()
            .map(|(column, value)| format!("{}=eq.{}", column, value))
    }

    /// Entry of the `postgres_changes` join config
    pub fn to_config(&self) -> Value {
        let mut config = json!({
            "event": self.event.map(ChangeKind::as_str).unwrap_or("*"),
            "schema": self.schema,
            "table": self.table,
        });
        if let Some(filter) = self.filter_string() {
            config["filter"] = json!(filter);
        }
        config
    }

    /// Whether a delivered change falls within this filter
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if self.event.is_some_and(|kind| kind != event.kind) {
            return false;
        }
        if self.schema != event.schema || self.table != event.table {
            return false;
        }
        match &self.predicate {
            None => true,
            Some((column, expected)) => match event.row().get(column) {
                Some(Value::String(actual)) => actual == expected,
                Some(Value::Null) | None => false,
                Some(other) => other.to_string() == *expected,
            },
        }
    }
}
