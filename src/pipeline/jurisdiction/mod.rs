pub mod matching;
pub mod registry;
pub mod detector;

pub use detector::EntityDetector;
pub use registry::{JurisdictionRegistry, RegisteredEntity, RegistryEntry};
