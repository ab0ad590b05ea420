use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{read_json_file, ConfigError};
use crate::models::{JurisdictionSet, JurisdictionTag};

/// One entity as written in a registry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Every tag whose policies govern this entity, its own tag first.
    pub jurisdictions: Vec<String>,
    /// Tag a document gets when it restricts itself to this entity.
    /// Defaults to the first of `jurisdictions`.
    #[serde(default)]
    pub scope: Option<String>,
}

/// A validated registry entity. The canonical name is always one of its aliases.
///
/// `scope` is what a policy declaring this entity is tagged with at ingestion;
/// `jurisdictions` is what a question about this entity may read. A country's
/// membership includes its parent regions while its scope does not, so a
/// country-only policy never reaches a sibling country.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredEntity {
    pub name: String,
    pub aliases: Vec<String>,
    pub scope: JurisdictionTag,
    pub jurisdictions: JurisdictionSet,
}

/// Static mapping from entity names/aliases to jurisdiction tags.
#[derive(Debug, Clone)]
pub struct JurisdictionRegistry {
    entities: Vec<RegisteredEntity>,
}

// ── Built-in table ──────────────────────────────────────────

type BuiltinEntry = (&'static str, &'static [&'static str], &'static [&'static str]);

static BUILTIN_ENTITIES: &[BuiltinEntry] = &[
    // Regions
    ("Asia-Pacific", &["asia-pacific", "asia pacific", "apac"], &["APAC"]),
    ("Europe", &["europe", "european union", "eu"], &["EU", "EMEA"]),
    ("Middle East", &["middle east"], &["ME", "EMEA"]),
    ("North America", &["north america"], &["NA", "AMERICAS"]),
    ("Latin America", &["latin america", "south america"], &["LATAM", "AMERICAS"]),
    // Americas
    ("United States", &["united states", "usa", "u.s.", "u.s.a.", "new york", "california"], &["US", "NA", "AMERICAS"]),
    ("Canada", &["canada", "toronto", "vancouver"], &["CA", "NA", "AMERICAS"]),
    ("Mexico", &["mexico", "mexico city"], &["MX", "NA", "AMERICAS"]),
    ("Brazil", &["brazil", "sao paulo"], &["BR", "LATAM", "AMERICAS"]),
    // Europe
    ("Germany", &["germany", "german", "berlin", "munich", "frankfurt"], &["DE", "EU", "EMEA"]),
    ("France", &["france", "french", "paris"], &["FR", "EU", "EMEA"]),
    ("United Kingdom", &["united kingdom", "uk", "england", "britain", "london"], &["GB", "EMEA"]),
    ("Switzerland", &["switzerland", "zurich", "geneva"], &["CH", "EMEA"]),
    // Middle East
    ("United Arab Emirates", &["united arab emirates", "uae", "dubai", "abu dhabi"], &["AE", "ME", "EMEA"]),
    // Asia-Pacific
    ("Japan", &["japan", "japanese", "tokyo", "osaka"], &["JP", "APAC"]),
    ("China", &["china", "chinese", "beijing", "shanghai"], &["CN", "APAC"]),
    ("South Korea", &["south korea", "korea", "seoul"], &["KR", "APAC"]),
    ("Taiwan", &["taiwan", "taipei"], &["TW", "APAC"]),
    ("Vietnam", &["vietnam", "hanoi", "ho chi minh city"], &["VN", "APAC"]),
    ("Indonesia", &["indonesia", "jakarta"], &["ID", "APAC"]),
    ("Thailand", &["thailand", "bangkok"], &["TH", "APAC"]),
    ("Malaysia", &["malaysia", "kuala lumpur"], &["MY", "APAC"]),
    ("Philippines", &["philippines", "manila"], &["PH", "APAC"]),
    ("Singapore", &["singapore"], &["SG", "APAC"]),
    ("India", &["india", "mumbai", "delhi", "bangalore"], &["IN", "APAC"]),
    ("Australia", &["australia", "sydney", "melbourne"], &["AU", "APAC"]),
];

impl JurisdictionRegistry {
    /// The built-in geographic table.
    pub fn builtin() -> Self {
        let entries = BUILTIN_ENTITIES
            .iter()
            .map(|(name, aliases, tags)| RegistryEntry {
                name: name.to_string(),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
                jurisdictions: tags.iter().map(|t| t.to_string()).collect(),
                scope: None,
            })
            .collect();
        // The built-in table is well-formed; `compile` only normalizes it.
        Self {
            entities: compile(entries).unwrap_or_default(),
        }
    }

    pub fn from_entries(entries: Vec<RegistryEntry>) -> Result<Self, ConfigError> {
        Ok(Self {
            entities: compile(entries)?,
        })
    }

    /// Parse a JSON array of [`RegistryEntry`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let entries: Vec<RegistryEntry> = serde_json::from_str(json)?;
        Self::from_entries(entries)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = read_json_file(path)?;
        let registry = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            entities = registry.len(),
            "Jurisdiction registry loaded"
        );
        Ok(registry)
    }

    pub fn entities(&self) -> &[RegisteredEntity] {
        &self.entities
    }

    /// Ingestion tag of the named entity.
    pub fn scope_of(&self, name: &str) -> Option<&JurisdictionTag> {
        self.lookup(name).map(|e| &e.scope)
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisteredEntity> {
        self.entities
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// All aliases of the named entity (empty when unknown).
    pub fn aliases_of(&self, name: &str) -> &[String] {
        self.lookup(name).map(|e| e.aliases.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for JurisdictionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn compile(entries: Vec<RegistryEntry>) -> Result<Vec<RegisteredEntity>, ConfigError> {
    let mut entities: Vec<RegisteredEntity> = Vec::with_capacity(entries.len());

    for entry in entries {
        let name = entry.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::Invalid("registry entity with empty name".into()));
        }
        if entities.iter().any(|e| e.name.eq_ignore_ascii_case(&name)) {
            return Err(ConfigError::Invalid(format!("duplicate registry entity: {name}")));
        }

        let tags: Vec<JurisdictionTag> = entry
            .jurisdictions
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(JurisdictionTag::new)
            .collect();

        let scope = match entry.scope.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => JurisdictionTag::new(s),
            _ => match tags.first() {
                Some(first) => first.clone(),
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "registry entity {name} has no jurisdictions"
                    )))
                }
            },
        };
        if scope.is_universal() {
            return Err(ConfigError::Invalid(format!(
                "registry entity {name} cannot be scoped to {scope}"
            )));
        }

        let mut jurisdictions: JurisdictionSet = tags.into_iter().collect();
        jurisdictions.insert(scope.clone());

        let mut aliases = vec![name.to_ascii_lowercase()];
        for alias in &entry.aliases {
            let alias = alias.trim().to_ascii_lowercase();
            if !alias.is_empty() && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        entities.push(RegisteredEntity {
            name,
            aliases,
            scope,
            jurisdictions,
        });
    }

    Ok(entities)
}
