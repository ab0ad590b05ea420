use std::sync::Arc;

use super::matching::find_phrase;
use super::registry::JurisdictionRegistry;
use crate::models::EntityMatch;

/// Scans free text for entities known to the registry.
///
/// Matching cannot fail: unknown places are silently not detected, which
/// downstream reads as "no decomposition needed".
#[derive(Debug, Clone)]
pub struct EntityDetector {
    registry: Arc<JurisdictionRegistry>,
}

impl EntityDetector {
    pub fn new(registry: Arc<JurisdictionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &JurisdictionRegistry {
        &self.registry
    }

    /// Entities mentioned in `text`, one per entity, ordered by first occurrence.
    pub fn detect(&self, text: &str) -> Vec<EntityMatch> {
        let mut found: Vec<(usize, EntityMatch)> = Vec::new();

        for entity in self.registry.entities() {
            let earliest = entity
                .aliases
                .iter()
                .filter_map(|alias| find_phrase(text, alias).first().map(|&pos| (pos, alias)))
                // Longest alias wins a tie at the same offset ("south korea" over "south").
                .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())));

            if let Some((pos, alias)) = earliest {
                found.push((
                    pos,
                    EntityMatch {
                        name: entity.name.clone(),
                        aliases_matched: alias.clone(),
                        jurisdictions: entity.jurisdictions.clone(),
                    },
                ));
            }
        }

        found.sort_by_key(|(pos, _)| *pos);
        let matches: Vec<EntityMatch> = found.into_iter().map(|(_, m)| m).collect();

        tracing::debug!(
            entities = matches.len(),
            names = ?matches.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "Entity detection complete"
        );
        matches
    }

    /// Whether `text` mentions the named entity through any of its aliases.
    pub fn mentions(&self, text: &str, entity_name: &str) -> bool {
        self.registry
            .aliases_of(entity_name)
            .iter()
            .any(|alias| !find_phrase(text, alias).is_empty())
    }
}
