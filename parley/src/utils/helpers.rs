use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use rand::Rng;

/// Where an upload lands inside the user's chat folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    File,
    Image,
    Audio,
}

impl AttachmentKind {
    /// Content tag prefixed to the caption of the message announcing the upload
    pub fn tag(self) -> &'static str {
        match self {
            AttachmentKind::File => "[File]",
            AttachmentKind::Image => "[Image]",
            AttachmentKind::Audio => "[Audio]",
        }
    }

    /// Word used in failure notices
    pub fn noun(self) -> &'static str {
        match self {
            AttachmentKind::File => "file",
            AttachmentKind::Image => "image",
            AttachmentKind::Audio => "audio",
        }
    }

    fn folder(self) -> Option<&'static str> {
        match self {
            AttachmentKind::File => None,
            AttachmentKind::Image => Some("images"),
            AttachmentKind::Audio => Some("audio"),
        }
    }
}

/// Random object name keeping the original file's extension
pub fn object_name(original: &str) -> String {
    let token: u64 = rand::thread_rng().gen();
    match original.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!("{:016x}.{}", token, ext),
        _ => format!("{:016x}", token),
    }
}

/// MIME type for an upload, from its extension
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "webm" => "audio/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// `{user}/{chat}/[images|audio/]{name}`
pub fn storage_path(user_id: &str, chat_id: &str, kind: AttachmentKind, name: &str) -> String {
    match kind.folder() {
        Some(folder) => format!("{}/{}/{}/{}", user_id, chat_id, folder, name),
        None => format!("{}/{}/{}", user_id, chat_id, name),
    }
}

/// "Today", "Yesterday" or the calendar date, relative to `today`
pub fn day_label(at: DateTime<Utc>, today: NaiveDate) -> String {
    let date = at.with_timezone(&Local).date_naive();
    if date == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(date) {
        "Yesterday".to_string()
    } else {
        date.format("%Y-%m-%d").to_string()
    }
}

/// Serde helper accepting both `timestamptz` and zone-less `timestamp` columns
pub mod timestamp {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// The same, for nullable columns
    pub mod option {
        use super::*;

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(at) => serializer.serialize_some(&at.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw))),
                None => Ok(None),
            }
        }
    }
}
