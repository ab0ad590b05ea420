use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::models::{JurisdictionSet, PassageChunk};
use crate::pipeline::jurisdiction::EntityDetector;

/// How far past a scope marker the declared jurisdictions are read.
const MAX_SCOPE_WINDOW: usize = 600;

/// Markers that state a scope directly, with no jurisdiction list to read.
static UNIVERSAL_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:applies|apply)\s+(?:to\s+)?(?:all|every)\s+(?:regions?|jurisdictions?|countries|locations|territories|offices)\b",
        r"(?i)\b(?:applies|apply)\s+(?:globally|worldwide)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Markers followed by a declared scope (a list of places or a universal word).
static SCOPE_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:applies|apply|applicable|valid)\s+(?:only|exclusively|solely)\s+(?:to|in|within)\b",
        r"(?i)\b(?:only|exclusively|solely)\s+(?:applies|apply)\s+(?:to|in|within)\b",
        r"(?i)\b(?:geographic(?:al)?\s+)?scope\s*:",
        r"(?i)\bscope\s+(?:is\s+)?(?:limited|restricted)\s+to\b",
        r"(?i)\bclassification\s*:",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static UNIVERSAL_WORDS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:global|globally|worldwide|everywhere|all\s+(?:regions|jurisdictions|countries|locations|territories))\b",
    )
    .ok()
});

/// Exclusion language ends a scope window: what follows names places the
/// policy does NOT cover.
static EXCLUSION_CUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:does\s+not|do\s+not|not\s+applicable|except|excluding|other\s+than)\b").ok()
});

/// Result of scanning one scope statement.
#[derive(Debug, Clone, PartialEq)]
enum Declaration {
    Universal,
    Restricted(JurisdictionSet),
    Unrecognized,
}

/// Assigns jurisdiction tags from a whole document's declared scope.
#[derive(Debug, Clone)]
pub struct IngestionTagger {
    detector: EntityDetector,
}

impl IngestionTagger {
    pub fn new(detector: EntityDetector) -> Self {
        Self { detector }
    }

    /// Tag every chunk of one document with the document's declared scope.
    ///
    /// Blank chunks are dropped; ordinals stay contiguous over the kept ones.
    pub fn tag<S: AsRef<str>>(&self, document_text: &str, chunks: &[S]) -> Vec<PassageChunk> {
        let source_document_id = document_id(document_text);
        let jurisdictions = self.declared_scope(document_text);

        let passages: Vec<PassageChunk> = chunks
            .iter()
            .map(|c| c.as_ref().trim())
            .filter(|c| !c.is_empty())
            .enumerate()
            .map(|(ordinal, content)| PassageChunk {
                content: content.to_string(),
                source_document_id: source_document_id.clone(),
                jurisdictions: jurisdictions.clone(),
                ordinal,
            })
            .collect();

        tracing::info!(
            document_id = %source_document_id,
            jurisdictions = %jurisdictions,
            chunks = passages.len(),
            "Document tagged"
        );
        passages
    }

    /// The jurisdiction set a document declares for itself.
    ///
    /// Restrictive declarations win over universal ones; a document with no
    /// recognizable declaration is universal.
    pub fn declared_scope(&self, document_text: &str) -> JurisdictionSet {
        let declarations = self.scan_declarations(document_text);

        let mut restricted = JurisdictionSet::new();
        let mut unrecognized = 0usize;
        for declaration in &declarations {
            match declaration {
                Declaration::Restricted(set) => restricted.extend(set),
                Declaration::Unrecognized => unrecognized += 1,
                Declaration::Universal => {}
            }
        }

        if !restricted.is_empty() {
            return restricted;
        }

        if unrecognized > 0 && !declarations.contains(&Declaration::Universal) {
            tracing::warn!(
                statements = unrecognized,
                "Scope statement names no known jurisdiction, tagging document universal"
            );
        }
        JurisdictionSet::universal_only()
    }

    fn scan_declarations(&self, text: &str) -> Vec<Declaration> {
        let mut declarations = Vec::new();

        for marker in UNIVERSAL_MARKERS.iter() {
            for m in marker.find_iter(text) {
                if !is_negated(text, m.start()) {
                    declarations.push(Declaration::Universal);
                }
            }
        }

        for marker in SCOPE_MARKERS.iter() {
            for m in marker.find_iter(text) {
                if is_negated(text, m.start()) {
                    continue;
                }
                let window = scope_window(text, m.end());
                declarations.push(self.read_window(window));
            }
        }

        declarations
    }

    fn read_window(&self, window: &str) -> Declaration {
        if UNIVERSAL_WORDS
            .as_ref()
            .is_some_and(|re| re.is_match(window))
        {
            return Declaration::Universal;
        }

        let entities = self.detector.detect(window);
        if entities.is_empty() {
            tracing::debug!(window = window.trim(), "Unrecognized scope statement");
            return Declaration::Unrecognized;
        }

        // Own tags only: parent regions would let the policy reach sibling entities.
        let set: JurisdictionSet = entities
            .iter()
            .filter_map(|entity| self.detector.registry().scope_of(&entity.name))
            .cloned()
            .collect();
        Declaration::Restricted(set)
    }
}

/// Deterministic id for a document: UUID v5 over its text.
pub fn document_id(document_text: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, document_text.as_bytes()).to_string()
}

/// Text following a scope marker, up to a blank line, the window limit, or
/// an exclusion cue.
fn scope_window(text: &str, start: usize) -> &str {
    let rest = &text[start..];
    let mut end = rest.find("\n\n").unwrap_or(rest.len()).min(MAX_SCOPE_WINDOW);
    while !rest.is_char_boundary(end) {
        end -= 1;
    }
    let window = &rest[..end];

    match EXCLUSION_CUE.as_ref().and_then(|re| re.find(window)) {
        Some(cue) => &window[..cue.start()],
        None => window,
    }
}

/// "does NOT apply only to", "never applicable only in", ...
fn is_negated(text: &str, start: usize) -> bool {
    let before = text[..start].trim_end();
    let tail_start = before
        .char_indices()
        .rev()
        .nth(11)
        .map_or(0, |(i, _)| i);
    let tail = before[tail_start..].to_ascii_lowercase();
    tail.ends_with(" not") || tail == "not" || tail.ends_with("n't") || tail.ends_with("never")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::models::JurisdictionTag;
    use crate::pipeline::jurisdiction::{JurisdictionRegistry, RegistryEntry};

    fn tagger() -> IngestionTagger {
        IngestionTagger::new(EntityDetector::new(Arc::new(JurisdictionRegistry::builtin())))
    }

    fn tag(s: &str) -> JurisdictionTag {
        JurisdictionTag::new(s)
    }

    const GLOBAL_POLICY: &str = "GLOBAL CORPORATE HOSPITALITY POLICY\n\
        Classification: GLOBAL - APPLIES TO ALL REGIONS\n\n\
        Client entertainment is permitted when reasonable and documented.";

    const APAC_ADDENDUM: &str = "APAC REGIONAL ADDENDUM\n\
        Geographic Scope: ASIA-PACIFIC REGION ONLY\n\n\
        This addendum applies ONLY to the following APAC countries:\n\
        - Japan\n- China\n- South Korea\n\n\
        This addendum does NOT apply to: Europe, North America, Latin America.\n\n\
        Client entertainment at karaoke venues is STRICTLY PROHIBITED.\n\
        NOT Prohibited in: Europe, North America.";

    #[test]
    fn global_classification_is_universal() {
        let scope = tagger().declared_scope(GLOBAL_POLICY);
        assert_eq!(scope, JurisdictionSet::universal_only());
    }

    #[test]
    fn regional_addendum_is_restricted() {
        let scope = tagger().declared_scope(APAC_ADDENDUM);
        assert!(scope.contains(&tag("APAC")));
        assert!(scope.contains(&tag("JP")));
        assert!(!scope.is_universal());
        assert!(!scope.contains(&tag("EU")));
        assert!(!scope.contains(&tag("NA")));
    }

    #[test]
    fn country_scope_excludes_parent_region() {
        let scope = tagger()
            .declared_scope("Scope: applies only to Japan.\n\nKaraoke with clients is strictly prohibited.");
        assert_eq!(scope, JurisdictionSet::from_iter(["JP"]));

        let china_query = JurisdictionRegistry::builtin()
            .lookup("China")
            .unwrap()
            .jurisdictions
            .with_universal();
        assert!(!scope.intersects(&china_query));
    }

    #[test]
    fn region_scope_is_the_region_tag() {
        let scope = tagger().declared_scope("This policy applies only to Europe.");
        assert_eq!(scope, JurisdictionSet::from_iter(["EU"]));
    }

    #[test]
    fn no_declaration_is_universal() {
        let scope = tagger().declared_scope("Gifts above $100 must be reported.");
        assert_eq!(scope, JurisdictionSet::universal_only());
    }

    #[test]
    fn unknown_place_in_scope_is_universal() {
        let scope = tagger().declared_scope("Scope: Atlantis only.");
        assert_eq!(scope, JurisdictionSet::universal_only());
    }

    #[test]
    fn exclusion_list_is_not_read_as_scope() {
        let scope = tagger()
            .declared_scope("This rule applies only to Japan and does not apply to Germany.");
        assert!(scope.contains(&tag("JP")));
        assert!(!scope.contains(&tag("DE")));
    }

    #[test]
    fn negated_marker_is_ignored() {
        let scope = tagger().declared_scope("This guidance does not apply only to France.");
        assert_eq!(scope, JurisdictionSet::universal_only());
    }

    #[test]
    fn every_chunk_gets_the_document_scope() {
        // Title chunk names a region the body never restricts to.
        let chunks = [
            "APAC REGIONAL ADDENDUM",
            "Geographic Scope: ASIA-PACIFIC REGION ONLY",
            "Client entertainment at karaoke venues is STRICTLY PROHIBITED.",
        ];
        let passages = tagger().tag(APAC_ADDENDUM, &chunks);
        assert_eq!(passages.len(), 3);
        let first = &passages[0];
        for passage in &passages {
            assert_eq!(passage.jurisdictions, first.jurisdictions);
            assert_eq!(passage.source_document_id, first.source_document_id);
        }
        assert_eq!(
            passages.iter().map(|p| p.ordinal).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn blank_chunks_are_skipped() {
        let passages = tagger().tag(GLOBAL_POLICY, &["first", "   ", "second"]);
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[1].ordinal, 1);
        assert_eq!(passages[1].content, "second");
    }

    #[test]
    fn document_id_is_deterministic() {
        assert_eq!(document_id(GLOBAL_POLICY), document_id(GLOBAL_POLICY));
        assert_ne!(document_id(GLOBAL_POLICY), document_id(APAC_ADDENDUM));
    }

    #[test]
    fn custom_registry_tags() {
        let registry = JurisdictionRegistry::from_entries(vec![RegistryEntry {
            name: "J2".into(),
            aliases: vec![],
            jurisdictions: vec!["J2".into()],
            scope: None,
        }])
        .unwrap();
        let tagger = IngestionTagger::new(EntityDetector::new(Arc::new(registry)));
        let scope = tagger.declared_scope("Scope: applies only to J2.\n\nActivity K is prohibited.");
        assert_eq!(scope, JurisdictionSet::from_iter(["J2"]));
    }
}
