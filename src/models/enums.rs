use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} value: {value:?}")]
pub struct ParseEnumError {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Variant order is declaration order, so derived `Ord` follows it.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ParseEnumError {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    /// Ordered LOW < MODERATE < HIGH < CRITICAL.
    RiskLevel {
        Low => "LOW",
        Moderate => "MODERATE",
        High => "HIGH",
        Critical => "CRITICAL",
    }
);

str_enum!(
    /// Ordered APPROVE < FLAG < BLOCK (permissive to conservative).
    ComplianceAction {
        Approve => "APPROVE",
        Flag => "FLAG",
        Block => "BLOCK",
    }
);

str_enum!(ComplianceStatus {
    Compliant => "COMPLIANT",
    RequiresReview => "REQUIRES_REVIEW",
    RiskDetected => "RISK_DETECTED",
});

str_enum!(DiagnosticStage {
    Sanitize => "sanitize",
    Decompose => "decompose",
    Retrieval => "retrieval",
    Generation => "generation",
    Parse => "parse",
    Timeout => "timeout",
});

impl RiskLevel {
    /// The action a judgment at this level implies when the model gave none.
    pub fn default_action(self) -> ComplianceAction {
        match self {
            RiskLevel::Low => ComplianceAction::Approve,
            RiskLevel::Moderate | RiskLevel::High => ComplianceAction::Flag,
            RiskLevel::Critical => ComplianceAction::Block,
        }
    }
}

impl ComplianceAction {
    /// Risk level implied by an action when the model gave no level.
    pub fn implied_risk(self) -> RiskLevel {
        match self {
            ComplianceAction::Approve => RiskLevel::Low,
            ComplianceAction::Flag => RiskLevel::Moderate,
            ComplianceAction::Block => RiskLevel::Critical,
        }
    }
}

impl ComplianceStatus {
    pub fn from_risk(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => ComplianceStatus::Compliant,
            RiskLevel::Moderate => ComplianceStatus::RequiresReview,
            RiskLevel::High | RiskLevel::Critical => ComplianceStatus::RiskDetected,
        }
    }
}
