/// RiceCoder Validation Rules
///
/// This crate provides the multi-scope validation rule engine for RiceCoder. Rules are
/// learned from reported errors, applied to code content with per-scope precedence
/// (project over client over organization over global), and promoted to broader scopes
/// once their recorded outcomes show they work.
pub mod autofix;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod extractor;
pub mod manager;
pub mod metrics;
pub mod models;
pub mod promotion;
pub mod promotion_threshold_property;
pub mod scope;
pub mod scope_ordering_property;
pub mod store;
pub mod validator;

// Re-export public types
pub use autofix::AutoFix;
pub use cache::{CacheStats, CompiledRule, CompiledRuleSet, ResolvedRules, RuleCache};
pub use compiler::{CompiledMatcher, LineMatch, PatternCompiler};
pub use config::{EngineConfig, EngineConfigLoader, PromotionThresholds, MAX_RETENTION_DAYS};
pub use error::{Result, RulesError};
pub use extractor::{ExtractedPattern, HeuristicKind, PatternExtractor};
pub use manager::ValidationRuleManager;
pub use metrics::LearningMetrics;
pub use models::{
    generate_rule_id, sort_by_precedence, AggregatedRule, CodePattern, ErrorDetails,
    LearningContext, PatternClassification, PatternType, RuleApplication, RuleCategory,
    RulePattern, RulePriority, RuleScope, ValidationRule,
};
pub use promotion::{PromotionEngine, PromotionHistoryEntry, PromotionReport, ScopeChange};
pub use scope::ScopeResolver;
pub use store::{
    ApplicationTotals, EffectivenessFilter, InMemoryRuleStore, JsonFileRuleStore, RuleQuery,
    RuleStore,
};
pub use validator::{Finding, ValidationApplier, ValidationReport, ValidationStats};
