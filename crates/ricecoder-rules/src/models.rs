/// Core data models for the validation rule engine
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RulesError;

/// Breadth of applicability of a rule, narrowest last in the ladder below
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    /// Applies everywhere
    Global,
    /// Applies to every client of the organization
    Organization,
    /// Applies to a single client
    Client,
    /// Applies to a single project
    Project,
}

impl RuleScope {
    /// Promotion ladder, narrowest first
    pub const LADDER: [RuleScope; 4] = [
        RuleScope::Project,
        RuleScope::Client,
        RuleScope::Organization,
        RuleScope::Global,
    ];

    /// Next broader scope on the ladder, `None` at global
    pub fn next(self) -> Option<RuleScope> {
        match self {
            RuleScope::Project => Some(RuleScope::Client),
            RuleScope::Client => Some(RuleScope::Organization),
            RuleScope::Organization => Some(RuleScope::Global),
            RuleScope::Global => None,
        }
    }

    /// Next narrower scope on the ladder, `None` at project
    pub fn previous(self) -> Option<RuleScope> {
        match self {
            RuleScope::Global => Some(RuleScope::Organization),
            RuleScope::Organization => Some(RuleScope::Client),
            RuleScope::Client => Some(RuleScope::Project),
            RuleScope::Project => None,
        }
    }

    /// Higher is more specific
    pub fn specificity(self) -> u8 {
        match self {
            RuleScope::Project => 3,
            RuleScope::Client => 2,
            RuleScope::Organization => 1,
            RuleScope::Global => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleScope::Global => "global",
            RuleScope::Organization => "organization",
            RuleScope::Client => "client",
            RuleScope::Project => "project",
        }
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleScope {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(RuleScope::Global),
            "organization" => Ok(RuleScope::Organization),
            "client" => Ok(RuleScope::Client),
            "project" => Ok(RuleScope::Project),
            other => Err(RulesError::InvalidScope(other.to_string())),
        }
    }
}

/// Category of problem a rule detects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Syntax,
    Performance,
    Security,
    Style,
    Api,
    General,
}

impl RuleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleCategory::Syntax => "syntax",
            RuleCategory::Performance => "performance",
            RuleCategory::Security => "security",
            RuleCategory::Style => "style",
            RuleCategory::Api => "api",
            RuleCategory::General => "general",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity a finding is reported with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePriority {
    Error,
    Warning,
    Suggestion,
}

impl RulePriority {
    /// Lower ranks are reported first
    pub fn rank(self) -> u8 {
        match self {
            RulePriority::Error => 0,
            RulePriority::Warning => 1,
            RulePriority::Suggestion => 2,
        }
    }
}

impl fmt::Display for RulePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePriority::Error => write!(f, "error"),
            RulePriority::Warning => write!(f, "warning"),
            RulePriority::Suggestion => write!(f, "suggestion"),
        }
    }
}

/// Closed set of pattern kinds the compiler knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Regex,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternType::Regex => write!(f, "regex"),
        }
    }
}

/// Stored pattern specification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RulePattern {
    pub text: String,
    pub pattern_type: PatternType,
}

impl RulePattern {
    pub fn regex(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pattern_type: PatternType::Regex,
        }
    }
}

/// Deterministic rule id: `{category}-{technology}-{8 hex chars}`
pub fn generate_rule_id(pattern: &str, category: RuleCategory, technology: &str) -> String {
    let digest = md5::compute(format!("{}|{}|{}", pattern, category, technology).as_bytes());
    let hex = format!("{:x}", digest);
    format!("{}-{}-{}", category, technology, &hex[..8])
}

/// A validation rule stored at one scope of the cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Unique identifier, derived from pattern, category and technology
    pub rule_id: String,
    /// Scope where the rule currently lives
    pub scope: RuleScope,
    pub category: RuleCategory,
    pub priority: RulePriority,
    /// Technology tag such as "javascript"
    pub technology: String,
    pub pattern: RulePattern,
    pub message: String,
    pub suggestion: Option<String>,
    /// Sed-style `s/search/replacement/flags` fix
    pub auto_fix_pattern: Option<String>,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f64,
    /// Number of times the underlying error was observed
    pub occurrences: u64,
    /// Externally computed usefulness (0.0 to 1.0)
    pub effectiveness_score: f64,
    pub is_active: bool,
    /// Project the rule was learned from
    pub learned_from: Option<String>,
    /// Client the rule was learned for
    pub client_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ValidationRule {
    /// Create a new active rule with a deterministic id
    pub fn new(
        pattern: RulePattern,
        category: RuleCategory,
        technology: impl Into<String>,
        scope: RuleScope,
        priority: RulePriority,
        message: impl Into<String>,
    ) -> Self {
        let technology = technology.into();
        let now = Utc::now();
        Self {
            rule_id: generate_rule_id(&pattern.text, category, &technology),
            scope,
            category,
            priority,
            technology,
            pattern,
            message: message.into(),
            suggestion: None,
            auto_fix_pattern: None,
            confidence: 0.5,
            occurrences: 1,
            effectiveness_score: 0.5,
            is_active: true,
            learned_from: None,
            client_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_auto_fix(mut self, auto_fix: impl Into<String>) -> Self {
        self.auto_fix_pattern = Some(auto_fix.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_effectiveness(mut self, score: f64) -> Self {
        self.effectiveness_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn learned_from(mut self, project: impl Into<String>) -> Self {
        self.learned_from = Some(project.into());
        self
    }

    pub fn for_client(mut self, client: impl Into<String>) -> Self {
        self.client_name = Some(client.into());
        self
    }

    /// Precedence order used for resolved rule sets.
    ///
    /// More specific scopes first, then errors before warnings before
    /// suggestions, then higher effectiveness, then higher confidence.
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        other
            .scope
            .specificity()
            .cmp(&self.scope.specificity())
            .then_with(|| self.priority.rank().cmp(&other.priority.rank()))
            .then_with(|| {
                other
                    .effectiveness_score
                    .partial_cmp(&self.effectiveness_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                other
                    .confidence
                    .partial_cmp(&self.confidence)
                    .unwrap_or(Ordering::Equal)
            })
    }
}

/// Stable sort into precedence order
pub fn sort_by_precedence(rules: &mut [ValidationRule]) {
    rules.sort_by(|a, b| a.precedence_cmp(b));
}

/// One match event of a rule against a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleApplication {
    pub id: String,
    pub rule_id: String,
    pub project_path: Option<String>,
    pub client_name: Option<String>,
    pub file_path: String,
    /// 1-based line of the match, `None` when the rule did not match
    pub line_number: Option<u32>,
    /// Whether the application produced a useful finding
    pub success: bool,
    pub execution_time_ms: f64,
    pub applied_at: DateTime<Utc>,
}

impl RuleApplication {
    pub fn new(
        rule_id: impl Into<String>,
        file_path: impl Into<String>,
        line_number: Option<u32>,
        success: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            rule_id: rule_id.into(),
            project_path: None,
            client_name: None,
            file_path: file_path.into(),
            line_number,
            success,
            execution_time_ms: 0.0,
            applied_at: Utc::now(),
        }
    }
}

/// Whether an observed pattern is an anti-pattern or a good practice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternClassification {
    Bad,
    Good,
}

/// Frequency-counted record of an error-derived pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodePattern {
    /// md5 of `pattern|category`
    pub signature: String,
    pub pattern_text: String,
    pub category: RuleCategory,
    pub context: serde_json::Value,
    pub frequency: u64,
    pub classification: PatternClassification,
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl CodePattern {
    pub fn signature_for(pattern_text: &str, category: RuleCategory) -> String {
        format!(
            "{:x}",
            md5::compute(format!("{}|{}", pattern_text, category).as_bytes())
        )
    }

    pub fn new(
        pattern_text: impl Into<String>,
        category: RuleCategory,
        context: serde_json::Value,
        confidence: f64,
    ) -> Self {
        let pattern_text = pattern_text.into();
        let now = Utc::now();
        Self {
            signature: Self::signature_for(&pattern_text, category),
            pattern_text,
            category,
            context,
            frequency: 1,
            classification: PatternClassification::Bad,
            confidence,
            first_seen: now,
            last_seen: now,
        }
    }
}

/// Rule joined with its application counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRule {
    pub rule: ValidationRule,
    pub applications: u64,
    pub successes: u64,
}

impl AggregatedRule {
    pub fn success_rate(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            self.successes as f64 / self.applications as f64
        }
    }
}

/// Raw error report handed to the learner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    pub code_snippet: Option<String>,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(snippet.into());
        self
    }

    pub fn at(mut self, file_path: impl Into<String>, line_number: u32) -> Self {
        self.file_path = Some(file_path.into());
        self.line_number = Some(line_number);
        self
    }
}

/// Where an error report came from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningContext {
    pub project_path: Option<String>,
    pub client_name: Option<String>,
    /// Falls back to the configured default technology
    pub technology: Option<String>,
}
