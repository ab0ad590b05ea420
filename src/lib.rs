pub mod config;
pub mod models;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use models::{
    ComplianceAction, ComplianceStatus, DiagnosticStage, EntityMatch, JurisdictionSet,
    JurisdictionTag, PassageChunk, RiskLevel,
};
pub use pipeline::rag::aggregate::{AggregateAnswer, ComplianceReport};
pub use pipeline::rag::orchestrator::ComplianceEngine;
pub use pipeline::rag::types::{Diagnostic, Judgment, LlmGenerate, SubQuery, VectorSearch};
pub use pipeline::rag::RagError;
pub use pipeline::storage::types::EmbeddingModel;

/// Install the fmt subscriber, filtered by `RUST_LOG` or the crate default.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{} logging initialized", config::APP_NAME, config::APP_VERSION);
    }
}
