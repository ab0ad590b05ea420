pub mod types;
pub mod sanitize;
pub mod escalation;

pub use escalation::{EscalationRule, EscalationTable};
pub use sanitize::{neutralize_delimiters, sanitize_question};
pub use types::{SafetyError, SanitizedInput};
