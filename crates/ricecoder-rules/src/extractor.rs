//! Heuristic extraction of rule patterns from error reports.
//!
//! Heuristics are tried most specific first and the first structural match
//! wins. Anything unrecognised produces no pattern at all.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{ErrorDetails, RuleCategory, RulePriority, RuleScope};

lazy_static! {
    static ref CLASS_PROPERTY_ERROR: Regex =
        Regex::new(r"(?i)(unexpected token\s*'?=|class propert)").unwrap();
    static ref CLASS_PROPERTY_LINE: Regex =
        Regex::new(r"(?m)^\s*(?:static\s+)?([A-Za-z_$][\w$]*)\s*=(?:[^=]|$)").unwrap();
    static ref GOVERNANCE_ERROR: Regex =
        Regex::new(r"(?i)(usage[ _]limit|governance|SSS_USAGE_LIMIT_EXCEEDED)").unwrap();
    static ref QUALIFIED_CALL: Regex =
        Regex::new(r"\b([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)+)\s*\(").unwrap();
    static ref INVALID_FIELD: Regex = Regex::new(
        r#"(?i)\binvalid\s+(?:field|column)(?:\s+(?:id|name))?\s*[:=]?\s*['"]?([A-Za-z_]\w*)"#
    )
    .unwrap();
    static ref NOT_DEFINED: Regex = Regex::new(r"([A-Za-z_$][\w$]*) is not defined").unwrap();
}

/// Which heuristic produced a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicKind {
    ClassPropertyAssignment,
    GovernanceUsageLimit,
    InvalidApiField,
    UndefinedIdentifier,
}

/// Candidate rule derived from an error report
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPattern {
    pub kind: HeuristicKind,
    /// Regex source
    pub pattern: String,
    pub category: RuleCategory,
    pub priority: RulePriority,
    pub confidence: f64,
    pub message: String,
    pub suggestion: Option<String>,
    pub auto_fix: Option<String>,
}

impl ExtractedPattern {
    /// Scope a freshly learned rule starts at
    pub fn initial_scope(&self, client_name: Option<&str>) -> RuleScope {
        let has_client = client_name.is_some_and(|c| !c.trim().is_empty());
        match (self.kind, self.category) {
            (_, RuleCategory::Syntax) => RuleScope::Global,
            (HeuristicKind::GovernanceUsageLimit, RuleCategory::Performance) => {
                RuleScope::Organization
            }
            (_, RuleCategory::Api) if has_client => RuleScope::Client,
            _ => RuleScope::Project,
        }
    }
}

/// Turns error reports into candidate patterns
#[derive(Debug, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// First matching heuristic, or `None` when the error is not recognised
    pub fn extract(&self, error: &ErrorDetails) -> Option<ExtractedPattern> {
        let snippet = error.code_snippet.as_deref().unwrap_or("");

        Self::class_property_assignment(&error.message, snippet)
            .or_else(|| Self::governance_usage_limit(&error.message, snippet))
            .or_else(|| Self::invalid_api_field(&error.message))
            .or_else(|| Self::undefined_identifier(&error.message))
    }

    fn class_property_assignment(message: &str, snippet: &str) -> Option<ExtractedPattern> {
        if !CLASS_PROPERTY_ERROR.is_match(message) {
            return None;
        }

        let name = CLASS_PROPERTY_LINE.captures(snippet)?.get(1)?.as_str();
        let escaped = regex::escape(name);

        Some(ExtractedPattern {
            kind: HeuristicKind::ClassPropertyAssignment,
            pattern: format!(r"^\s*(?:static\s+)?{}\s*=(?:[^=]|$)", escaped),
            category: RuleCategory::Syntax,
            priority: RulePriority::Error,
            confidence: 0.9,
            message: format!(
                "Class property '{}' is assigned with field syntax, which is not supported",
                name
            ),
            suggestion: Some(format!(
                "Initialise '{}' in the constructor with this.{} = ...",
                name, name
            )),
            auto_fix: Some(format!(
                r"s/^(\s*)(static\s+)?{}\s*=/\1this.{} =/",
                escaped, name
            )),
        })
    }

    fn governance_usage_limit(message: &str, snippet: &str) -> Option<ExtractedPattern> {
        if !GOVERNANCE_ERROR.is_match(message) {
            return None;
        }

        let call = QUALIFIED_CALL.captures(snippet)?.get(1)?.as_str();

        Some(ExtractedPattern {
            kind: HeuristicKind::GovernanceUsageLimit,
            pattern: format!(r"\b{}\s*\(", regex::escape(call)),
            category: RuleCategory::Performance,
            priority: RulePriority::Warning,
            confidence: 0.8,
            message: format!(
                "'{}' consumes governance units and can exceed usage limits",
                call
            ),
            suggestion: Some(format!(
                "Batch the work or move '{}' out of loops",
                call
            )),
            auto_fix: None,
        })
    }

    fn invalid_api_field(message: &str) -> Option<ExtractedPattern> {
        let field = INVALID_FIELD.captures(message)?.get(1)?.as_str();

        Some(ExtractedPattern {
            kind: HeuristicKind::InvalidApiField,
            pattern: format!(r#"['"]{}['"]"#, regex::escape(field)),
            category: RuleCategory::Api,
            priority: RulePriority::Error,
            confidence: 0.75,
            message: format!("Field '{}' was rejected by the API", field),
            suggestion: Some(format!(
                "Check that '{}' exists for this record type",
                field
            )),
            auto_fix: None,
        })
    }

    fn undefined_identifier(message: &str) -> Option<ExtractedPattern> {
        let name = NOT_DEFINED.captures(message)?.get(1)?.as_str();

        Some(ExtractedPattern {
            kind: HeuristicKind::UndefinedIdentifier,
            pattern: format!(r"\b{}\b", regex::escape(name)),
            category: RuleCategory::Syntax,
            priority: RulePriority::Error,
            confidence: 0.7,
            message: format!("'{}' is not defined", name),
            suggestion: Some(format!("Declare or import '{}' before use", name)),
            auto_fix: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autofix::AutoFix;

    fn extract(message: &str, snippet: Option<&str>) -> Option<ExtractedPattern> {
        let mut error = ErrorDetails::new(message);
        error.code_snippet = snippet.map(str::to_string);
        PatternExtractor::new().extract(&error)
    }

    #[test]
    fn test_class_property_assignment() {
        let extracted = extract(
            "SyntaxError: Unexpected token '='",
            Some("class Cart {\n  items = [];\n}"),
        )
        .unwrap();

        assert_eq!(extracted.kind, HeuristicKind::ClassPropertyAssignment);
        assert_eq!(extracted.category, RuleCategory::Syntax);
        assert_eq!(extracted.confidence, 0.9);

        let regex = Regex::new(&extracted.pattern).unwrap();
        assert!(regex.is_match("  items = [];"));
        assert!(!regex.is_match("  if (items == x) {"));
        assert!(!regex.is_match("  this.items = [];"));

        let fix = AutoFix::parse(extracted.auto_fix.as_deref().unwrap()).unwrap();
        assert_eq!(fix.apply("  items = [];").as_deref(), Some("  this.items = [];"));
    }

    #[test]
    fn test_class_property_wins_over_undefined_fallback() {
        let extracted = extract(
            "SyntaxError: Unexpected token '=' (total is not defined)",
            Some("  total = 0;"),
        )
        .unwrap();
        assert_eq!(extracted.kind, HeuristicKind::ClassPropertyAssignment);
    }

    #[test]
    fn test_governance_usage_limit() {
        let extracted = extract(
            "SSS_USAGE_LIMIT_EXCEEDED: Script Execution Usage Limit Exceeded",
            Some("for (const id of ids) {\n  const rec = record.load({ id });\n}"),
        )
        .unwrap();

        assert_eq!(extracted.kind, HeuristicKind::GovernanceUsageLimit);
        assert_eq!(extracted.category, RuleCategory::Performance);
        assert_eq!(extracted.confidence, 0.8);
        assert_eq!(extracted.pattern, r"\brecord\.load\s*\(");
        assert_eq!(extracted.initial_scope(Some("acme")), RuleScope::Organization);
    }

    #[test]
    fn test_governance_without_call_falls_through() {
        assert!(extract("usage limit exceeded", Some("let a = 1;")).is_none());
    }

    #[test]
    fn test_invalid_api_field() {
        let extracted = extract("INVALID_FLD_VALUE: Invalid field id: custbody_region", None).unwrap();
        assert_eq!(extracted.kind, HeuristicKind::InvalidApiField);
        assert_eq!(extracted.category, RuleCategory::Api);

        let regex = Regex::new(&extracted.pattern).unwrap();
        assert!(regex.is_match("rec.getValue('custbody_region')"));
        assert_eq!(extracted.initial_scope(Some("acme")), RuleScope::Client);
        assert_eq!(extracted.initial_scope(None), RuleScope::Project);
    }

    #[test]
    fn test_undefined_identifier() {
        let extracted = extract("ReferenceError: moment is not defined", None).unwrap();
        assert_eq!(extracted.kind, HeuristicKind::UndefinedIdentifier);
        assert_eq!(extracted.pattern, r"\bmoment\b");
        assert_eq!(extracted.confidence, 0.7);
        assert_eq!(extracted.initial_scope(None), RuleScope::Global);
    }

    #[test]
    fn test_unrecognised_error_yields_nothing() {
        assert!(extract("qwpoeiruty zmxncbv", Some("whatever();")).is_none());
        assert!(extract("", None).is_none());
    }
}
