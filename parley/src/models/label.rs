use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_LABEL_COLOR: &str = "#3B82F6";

/// A tag attached to a chat.
///
/// Rows come in three shapes depending on schema version: a bare string from
/// the old text-array column, a label object, or a `chat_labels` join row
/// wrapping the label under `labels`.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: Option<String>,
    pub name: String,
    pub color: String,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            color: DEFAULT_LABEL_COLOR.to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Deserialize)]
struct LabelObject {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    color: Option<String>,
}

impl From<LabelObject> for Label {
    fn from(obj: LabelObject) -> Self {
        Self {
            id: obj.id,
            name: obj.name,
            color: obj.color.unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelRow {
    Name(String),
    Link { labels: LabelObject },
    Object(LabelObject),
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match LabelRow::deserialize(deserializer)? {
            LabelRow::Name(name) => Label::new(name),
            LabelRow::Link { labels } => labels.into(),
            LabelRow::Object(obj) => obj.into(),
        })
    }
}
