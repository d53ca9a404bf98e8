//! Rule store gateway.
//!
//! The store is the only writer of persisted rule state. The engine talks to
//! it through [`RuleStore`]; two adapters ship with the crate, an in-memory
//! store and a directory-backed JSON store.

mod json;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    AggregatedRule, CodePattern, RuleApplication, RulePriority, RuleScope, ValidationRule,
};
use crate::scope::ScopeResolver;

pub use json::JsonFileRuleStore;
pub use memory::InMemoryRuleStore;

/// Selection of rules for one validation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleQuery {
    pub scopes: Vec<RuleScope>,
    /// Empty means every technology
    pub technologies: Vec<String>,
    pub client_name: Option<String>,
    pub project_path: Option<String>,
}

impl RuleQuery {
    /// Query for one validation request; scopes come from the `ScopeResolver`
    pub fn for_request(
        client_name: Option<&str>,
        project_path: Option<&str>,
        technologies: &[String],
    ) -> Self {
        let client_name = client_name.filter(|c| !c.trim().is_empty());
        let project_path = project_path.filter(|p| !p.trim().is_empty());
        Self {
            scopes: ScopeResolver::resolve(client_name, project_path),
            technologies: technologies.to_vec(),
            client_name: client_name.map(str::to_string),
            project_path: project_path.map(str::to_string),
        }
    }

    /// Whether an active rule belongs in this query's result
    pub fn matches(&self, rule: &ValidationRule) -> bool {
        if !rule.is_active || !self.scopes.contains(&rule.scope) {
            return false;
        }

        if !self.technologies.is_empty() && !self.technologies.contains(&rule.technology) {
            return false;
        }

        match rule.scope {
            RuleScope::Client => match (&rule.client_name, &self.client_name) {
                (Some(owner), Some(client)) => owner == client,
                (Some(_), None) => false,
                (None, _) => true,
            },
            RuleScope::Project => match (&rule.learned_from, &self.project_path) {
                (Some(owner), Some(project)) => owner == project,
                (Some(_), None) => false,
                (None, _) => true,
            },
            RuleScope::Global | RuleScope::Organization => true,
        }
    }
}

/// Filter for effectiveness aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct EffectivenessFilter {
    pub scopes: Vec<RuleScope>,
    /// Strict lower bound on `effectiveness_score`
    pub min_effectiveness: f64,
    /// Strict lower bound on `confidence`
    pub min_confidence: f64,
    /// Inclusive lower bound on application count
    pub min_applications: u64,
}

impl EffectivenessFilter {
    pub fn accepts(&self, rule: &ValidationRule) -> bool {
        rule.is_active
            && self.scopes.contains(&rule.scope)
            && rule.effectiveness_score > self.min_effectiveness
            && rule.confidence > self.min_confidence
    }
}

/// Application counts across every rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplicationTotals {
    pub applications: u64,
    pub successes: u64,
}

/// Persistence boundary of the engine
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active rules matching the query, in precedence order
    async fn list_rules(&self, query: &RuleQuery) -> Result<Vec<ValidationRule>>;

    /// Every stored rule, active or not
    async fn all_rules(&self) -> Result<Vec<ValidationRule>>;

    async fn get_rule(&self, rule_id: &str) -> Result<Option<ValidationRule>>;

    async fn find_rule_by_pattern_and_technology(
        &self,
        pattern: &str,
        technology: &str,
    ) -> Result<Option<ValidationRule>>;

    async fn insert_rule(&self, rule: ValidationRule) -> Result<()>;

    /// Bump `occurrences` and raise `confidence` by `confidence_increment`, capped at 1.0
    async fn update_rule_occurrence(
        &self,
        rule_id: &str,
        confidence_increment: f64,
    ) -> Result<ValidationRule>;

    async fn set_scope(&self, rule_id: &str, scope: RuleScope) -> Result<ValidationRule>;

    async fn set_active(&self, rule_id: &str, active: bool) -> Result<ValidationRule>;

    async fn set_effectiveness(&self, rule_id: &str, score: f64) -> Result<ValidationRule>;

    async fn record_application(&self, application: RuleApplication) -> Result<()>;

    async fn aggregate_effectiveness(
        &self,
        filter: &EffectivenessFilter,
    ) -> Result<Vec<AggregatedRule>>;

    async fn application_totals(&self) -> Result<ApplicationTotals>;

    /// Drop applications older than `before` whose rule has one of `priorities`
    async fn prune_applications(
        &self,
        before: DateTime<Utc>,
        priorities: &[RulePriority],
    ) -> Result<usize>;

    /// Insert a new pattern or bump the frequency of an existing signature
    async fn upsert_code_pattern(&self, pattern: CodePattern) -> Result<CodePattern>;

    async fn list_code_patterns(&self) -> Result<Vec<CodePattern>>;
}
