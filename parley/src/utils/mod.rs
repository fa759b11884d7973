mod helpers;
pub mod validation;

pub use helpers::{content_type_for, day_label, object_name, storage_path, timestamp, AttachmentKind};
