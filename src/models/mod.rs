pub mod enums;
pub mod jurisdiction;

use serde::{Deserialize, Serialize};

pub use enums::{ComplianceAction, ComplianceStatus, DiagnosticStage, ParseEnumError, RiskLevel};
pub use jurisdiction::{EntityMatch, JurisdictionSet, JurisdictionTag, UNIVERSAL_TAG};

/// A unit of ingested policy text.
///
/// `jurisdictions` comes from the whole source document's declared scope,
/// so every chunk of one document carries the same set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageChunk {
    pub content: String,
    pub source_document_id: String,
    pub jurisdictions: JurisdictionSet,
    /// Position of the chunk within its source document.
    pub ordinal: usize,
}
