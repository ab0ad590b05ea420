use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Question text after sanitization, with a record of what changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizedInput {
    pub text: String,
    pub was_modified: bool,
    pub modifications: Vec<InputModification>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputModification {
    pub kind: InputModificationKind,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InputModificationKind {
    InvisibleUnicodeRemoved,
    InjectionPatternRemoved,
    ExcessiveLengthTruncated,
    ControlCharacterRemoved,
}

/// Safety layer errors.
#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Question is empty after sanitization")]
    EmptyInput,
}
