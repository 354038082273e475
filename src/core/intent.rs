//! Query intent classification types.
//!
//! The intent type drives routing: fast-path intents skip team
//! execution entirely, the rest select one or more execution teams.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Classified intent of a user query.
///
/// Serialized names match the classifier's JSON output
/// (`LEGAL_CONSULT`, `GREETING`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    /// Legal question about real-estate statutes or rights.
    LegalConsult,
    /// Market price or trend question.
    MarketInquiry,
    /// Review of a specific contract or clause.
    ContractReview,
    /// Compound query spanning several of the above.
    Comprehensive,
    /// Outside the real-estate domain.
    Irrelevant,
    /// Cannot be classified with confidence.
    Unclear,
    /// Social opening with no task content.
    Greeting,
}

impl IntentType {
    /// Returns `true` for intents that take the fast path: no team
    /// execution, a fixed template response, exactly one LLM call total.
    #[must_use]
    pub const fn is_fast_path(self) -> bool {
        matches!(self, Self::Irrelevant | Self::Unclear | Self::Greeting)
    }

    /// Parses an intent string (case-insensitive). Unknown values map
    /// to [`IntentType::Unclear`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "LEGAL_CONSULT" => Self::LegalConsult,
            "MARKET_INQUIRY" => Self::MarketInquiry,
            "CONTRACT_REVIEW" => Self::ContractReview,
            "COMPREHENSIVE" => Self::Comprehensive,
            "IRRELEVANT" => Self::Irrelevant,
            "GREETING" => Self::Greeting,
            _ => Self::Unclear,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LegalConsult => "LEGAL_CONSULT",
            Self::MarketInquiry => "MARKET_INQUIRY",
            Self::ContractReview => "CONTRACT_REVIEW",
            Self::Comprehensive => "COMPREHENSIVE",
            Self::Irrelevant => "IRRELEVANT",
            Self::Unclear => "UNCLEAR",
            Self::Greeting => "GREETING",
        }
    }
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full classification result from planning stage 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// Classified intent type.
    pub intent_type: IntentType,
    /// Classifier confidence in [0, 1].
    #[serde(default)]
    pub confidence: f32,
    /// Extracted slots (law names, regions, amounts, ...).
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
    /// Salient keywords in query order.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Whether the query falls inside the real-estate domain.
    #[serde(default = "default_in_scope")]
    pub is_in_scope: bool,
}

const fn default_in_scope() -> bool {
    true
}

impl Intent {
    /// Fallback intent used when both classification attempts fail.
    #[must_use]
    pub fn unclear() -> Self {
        Self {
            intent_type: IntentType::Unclear,
            confidence: 0.0,
            entities: BTreeMap::new(),
            keywords: Vec::new(),
            is_in_scope: false,
        }
    }

    /// Clamps `confidence` into [0, 1] and normalizes scope for
    /// fast-path intents. Applied once after parsing; the intent is
    /// immutable downstream.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.confidence.is_finite() {
            self.confidence = 0.0;
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        if matches!(self.intent_type, IntentType::Irrelevant) {
            self.is_in_scope = false;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("LEGAL_CONSULT", IntentType::LegalConsult ; "legal consult uppercase")]
    #[test_case("legal_consult", IntentType::LegalConsult ; "legal consult lowercase")]
    #[test_case("MARKET_INQUIRY", IntentType::MarketInquiry ; "market inquiry uppercase")]
    #[test_case("GREETING", IntentType::Greeting ; "greeting uppercase")]
    #[test_case("nonsense", IntentType::Unclear ; "nonsense input")]
    fn test_parse(input: &str, expected: IntentType) {
        assert_eq!(IntentType::parse(input), expected);
    }

    #[test]
    fn test_fast_path_membership() {
        assert!(IntentType::Greeting.is_fast_path());
        assert!(IntentType::Irrelevant.is_fast_path());
        assert!(IntentType::Unclear.is_fast_path());
        assert!(!IntentType::LegalConsult.is_fast_path());
        assert!(!IntentType::Comprehensive.is_fast_path());
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&IntentType::LegalConsult).unwrap_or_default();
        assert_eq!(json, "\"LEGAL_CONSULT\"");
        let parsed: IntentType = serde_json::from_str("\"CONTRACT_REVIEW\"")
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(parsed, IntentType::ContractReview);
    }

    #[test]
    fn test_intent_deserialization_defaults() {
        let json = r#"{"intent_type": "GREETING"}"#;
        let intent: Intent = serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(intent.intent_type, IntentType::Greeting);
        assert!(intent.entities.is_empty());
        assert!(intent.keywords.is_empty());
        assert!(intent.is_in_scope);
    }

    #[test]
    fn test_normalized_clamps_confidence() {
        let intent = Intent {
            intent_type: IntentType::LegalConsult,
            confidence: 1.7,
            entities: BTreeMap::new(),
            keywords: Vec::new(),
            is_in_scope: true,
        };
        assert!((intent.normalized().confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_normalized_irrelevant_out_of_scope() {
        let intent = Intent {
            intent_type: IntentType::Irrelevant,
            confidence: 0.9,
            entities: BTreeMap::new(),
            keywords: Vec::new(),
            is_in_scope: true,
        };
        assert!(!intent.normalized().is_in_scope);
    }
}
