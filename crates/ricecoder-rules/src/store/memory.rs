use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{ApplicationTotals, EffectivenessFilter, RuleQuery, RuleStore};
use crate::error::{Result, RulesError};
use crate::models::{
    sort_by_precedence, AggregatedRule, CodePattern, RuleApplication, RulePriority, RuleScope,
    ValidationRule,
};

/// One update to a stored rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RuleChange {
    /// Bump occurrences and raise confidence by the increment, capped at 1.0
    Occurrence(f64),
    Scope(RuleScope),
    Active(bool),
    Effectiveness(f64),
}

impl RuleChange {
    pub fn apply(self, rule: &mut ValidationRule) {
        match self {
            RuleChange::Occurrence(increment) => {
                rule.occurrences += 1;
                rule.confidence = (rule.confidence + increment).min(1.0);
            }
            RuleChange::Scope(scope) => rule.scope = scope,
            RuleChange::Active(active) => rule.is_active = active,
            RuleChange::Effectiveness(score) => rule.effectiveness_score = score.clamp(0.0, 1.0),
        }
        rule.updated_at = Utc::now();
    }
}

/// Plain store contents shared by the in-memory and file adapters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    pub rules: HashMap<String, ValidationRule>,
    pub applications: Vec<RuleApplication>,
    pub patterns: HashMap<String, CodePattern>,
}

impl StoreState {
    pub fn ensure_new_rule(&self, rule_id: &str) -> Result<()> {
        if self.rules.contains_key(rule_id) {
            return Err(RulesError::StoreError(format!(
                "Rule '{}' already exists",
                rule_id
            )));
        }
        Ok(())
    }

    /// Updated copy of a rule; the state itself is left untouched
    pub fn changed_rule(&self, rule_id: &str, change: RuleChange) -> Result<ValidationRule> {
        let mut rule = self
            .rules
            .get(rule_id)
            .cloned()
            .ok_or_else(|| RulesError::RuleNotFound(rule_id.to_string()))?;
        change.apply(&mut rule);
        Ok(rule)
    }

    /// Drop prunable applications, returning how many went
    pub fn prune_applications(
        &mut self,
        before: DateTime<Utc>,
        priorities: &[RulePriority],
    ) -> usize {
        let rules = &self.rules;
        let original = self.applications.len();

        self.applications.retain(|application| {
            let prunable = application.applied_at < before
                && rules
                    .get(&application.rule_id)
                    .is_some_and(|rule| priorities.contains(&rule.priority));
            !prunable
        });

        original - self.applications.len()
    }
}

/// Insert a pattern or bump the frequency of its signature
pub(crate) fn merge_code_pattern(
    patterns: &mut HashMap<String, CodePattern>,
    pattern: CodePattern,
) -> CodePattern {
    patterns
        .entry(pattern.signature.clone())
        .and_modify(|existing| {
            existing.frequency += 1;
            existing.last_seen = Utc::now();
            existing.confidence = existing.confidence.max(pattern.confidence);
            existing.context = pattern.context.clone();
        })
        .or_insert_with(|| pattern.clone())
        .clone()
}

/// `RuleStore` kept entirely in memory
#[derive(Clone, Default)]
pub struct InMemoryRuleStore {
    state: Arc<RwLock<StoreState>>,
    list_calls: Arc<AtomicUsize>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: StoreState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            list_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `list_rules` calls served so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// All recorded applications, oldest first
    pub async fn applications(&self) -> Vec<RuleApplication> {
        self.state.read().await.applications.clone()
    }

    pub(crate) async fn snapshot(&self) -> StoreState {
        self.state.read().await.clone()
    }

    pub(crate) async fn patterns_snapshot(&self) -> HashMap<String, CodePattern> {
        self.state.read().await.patterns.clone()
    }

    pub(crate) async fn ensure_new_rule(&self, rule_id: &str) -> Result<()> {
        self.state.read().await.ensure_new_rule(rule_id)
    }

    pub(crate) async fn changed_rule(
        &self,
        rule_id: &str,
        change: RuleChange,
    ) -> Result<ValidationRule> {
        self.state.read().await.changed_rule(rule_id, change)
    }

    /// Store a rule as-is, replacing any previous version
    pub(crate) async fn put_rule(&self, rule: ValidationRule) {
        self.state.write().await.rules.insert(rule.rule_id.clone(), rule);
    }

    pub(crate) async fn set_applications(&self, applications: Vec<RuleApplication>) {
        self.state.write().await.applications = applications;
    }

    pub(crate) async fn set_patterns(&self, patterns: HashMap<String, CodePattern>) {
        self.state.write().await.patterns = patterns;
    }

    async fn change_rule(&self, rule_id: &str, change: RuleChange) -> Result<ValidationRule> {
        let mut state = self.state.write().await;
        let rule = state.changed_rule(rule_id, change)?;
        state.rules.insert(rule.rule_id.clone(), rule.clone());
        Ok(rule)
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_rules(&self, query: &RuleQuery) -> Result<Vec<ValidationRule>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let state = self.state.read().await;
        let mut rules: Vec<ValidationRule> = state
            .rules
            .values()
            .filter(|rule| query.matches(rule))
            .cloned()
            .collect();
        // HashMap order is arbitrary; settle ties on id before the stable sort.
        rules.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        sort_by_precedence(&mut rules);
        Ok(rules)
    }

    async fn all_rules(&self) -> Result<Vec<ValidationRule>> {
        let state = self.state.read().await;
        let mut rules: Vec<ValidationRule> = state.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        Ok(rules)
    }

    async fn get_rule(&self, rule_id: &str) -> Result<Option<ValidationRule>> {
        Ok(self.state.read().await.rules.get(rule_id).cloned())
    }

    async fn find_rule_by_pattern_and_technology(
        &self,
        pattern: &str,
        technology: &str,
    ) -> Result<Option<ValidationRule>> {
        let state = self.state.read().await;
        Ok(state
            .rules
            .values()
            .find(|rule| rule.pattern.text == pattern && rule.technology == technology)
            .cloned())
    }

    async fn insert_rule(&self, rule: ValidationRule) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_new_rule(&rule.rule_id)?;
        state.rules.insert(rule.rule_id.clone(), rule);
        Ok(())
    }

    async fn update_rule_occurrence(
        &self,
        rule_id: &str,
        confidence_increment: f64,
    ) -> Result<ValidationRule> {
        self.change_rule(rule_id, RuleChange::Occurrence(confidence_increment))
            .await
    }

    async fn set_scope(&self, rule_id: &str, scope: RuleScope) -> Result<ValidationRule> {
        self.change_rule(rule_id, RuleChange::Scope(scope)).await
    }

    async fn set_active(&self, rule_id: &str, active: bool) -> Result<ValidationRule> {
        self.change_rule(rule_id, RuleChange::Active(active)).await
    }

    async fn set_effectiveness(&self, rule_id: &str, score: f64) -> Result<ValidationRule> {
        self.change_rule(rule_id, RuleChange::Effectiveness(score))
            .await
    }

    async fn record_application(&self, application: RuleApplication) -> Result<()> {
        self.state.write().await.applications.push(application);
        Ok(())
    }

    async fn aggregate_effectiveness(
        &self,
        filter: &EffectivenessFilter,
    ) -> Result<Vec<AggregatedRule>> {
        let state = self.state.read().await;

        let mut counts: HashMap<&str, (u64, u64)> = HashMap::new();
        for application in &state.applications {
            let entry = counts.entry(application.rule_id.as_str()).or_default();
            entry.0 += 1;
            if application.success {
                entry.1 += 1;
            }
        }

        let mut aggregated: Vec<AggregatedRule> = state
            .rules
            .values()
            .filter(|rule| filter.accepts(rule))
            .filter_map(|rule| {
                let (applications, successes) =
                    counts.get(rule.rule_id.as_str()).copied().unwrap_or_default();
                (applications >= filter.min_applications).then(|| AggregatedRule {
                    rule: rule.clone(),
                    applications,
                    successes,
                })
            })
            .collect();

        aggregated.sort_by(|a, b| a.rule.rule_id.cmp(&b.rule.rule_id));
        aggregated.sort_by(|a, b| a.rule.precedence_cmp(&b.rule));
        Ok(aggregated)
    }

    async fn application_totals(&self) -> Result<ApplicationTotals> {
        let state = self.state.read().await;
        let applications = state.applications.len() as u64;
        let successes = state.applications.iter().filter(|a| a.success).count() as u64;
        Ok(ApplicationTotals {
            applications,
            successes,
        })
    }

    async fn prune_applications(
        &self,
        before: DateTime<Utc>,
        priorities: &[RulePriority],
    ) -> Result<usize> {
        Ok(self
            .state
            .write()
            .await
            .prune_applications(before, priorities))
    }

    async fn upsert_code_pattern(&self, pattern: CodePattern) -> Result<CodePattern> {
        let mut state = self.state.write().await;
        Ok(merge_code_pattern(&mut state.patterns, pattern))
    }

    async fn list_code_patterns(&self) -> Result<Vec<CodePattern>> {
        let state = self.state.read().await;
        let mut patterns: Vec<CodePattern> = state.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then(a.signature.cmp(&b.signature))
        });
        Ok(patterns)
    }
}
