/// Shared test doubles for integration tests
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ricecoder_rules::{
    AggregatedRule, ApplicationTotals, CodePattern, EffectivenessFilter, InMemoryRuleStore,
    Result, RuleApplication, RulePriority, RuleQuery, RuleScope, RuleStore, RulesError,
    ValidationRule,
};

/// Store wrapper that can be switched into a failing state
#[derive(Default)]
pub struct FlakyRuleStore {
    pub inner: InMemoryRuleStore,
    failing: AtomicBool,
}

impl FlakyRuleStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RulesError::StoreError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RuleStore for FlakyRuleStore {
    async fn list_rules(&self, query: &RuleQuery) -> Result<Vec<ValidationRule>> {
        self.check()?;
        self.inner.list_rules(query).await
    }

    async fn all_rules(&self) -> Result<Vec<ValidationRule>> {
        self.check()?;
        self.inner.all_rules().await
    }

    async fn get_rule(&self, rule_id: &str) -> Result<Option<ValidationRule>> {
        self.check()?;
        self.inner.get_rule(rule_id).await
    }

    async fn find_rule_by_pattern_and_technology(
        &self,
        pattern: &str,
        technology: &str,
    ) -> Result<Option<ValidationRule>> {
        self.check()?;
        self.inner
            .find_rule_by_pattern_and_technology(pattern, technology)
            .await
    }

    async fn insert_rule(&self, rule: ValidationRule) -> Result<()> {
        self.check()?;
        self.inner.insert_rule(rule).await
    }

    async fn update_rule_occurrence(
        &self,
        rule_id: &str,
        confidence_increment: f64,
    ) -> Result<ValidationRule> {
        self.check()?;
        self.inner
            .update_rule_occurrence(rule_id, confidence_increment)
            .await
    }

    async fn set_scope(&self, rule_id: &str, scope: RuleScope) -> Result<ValidationRule> {
        self.check()?;
        self.inner.set_scope(rule_id, scope).await
    }

    async fn set_active(&self, rule_id: &str, active: bool) -> Result<ValidationRule> {
        self.check()?;
        self.inner.set_active(rule_id, active).await
    }

    async fn set_effectiveness(&self, rule_id: &str, score: f64) -> Result<ValidationRule> {
        self.check()?;
        self.inner.set_effectiveness(rule_id, score).await
    }

    async fn record_application(&self, application: RuleApplication) -> Result<()> {
        self.check()?;
        self.inner.record_application(application).await
    }

    async fn aggregate_effectiveness(
        &self,
        filter: &EffectivenessFilter,
    ) -> Result<Vec<AggregatedRule>> {
        self.check()?;
        self.inner.aggregate_effectiveness(filter).await
    }

    async fn application_totals(&self) -> Result<ApplicationTotals> {
        self.check()?;
        self.inner.application_totals().await
    }

    async fn prune_applications(
        &self,
        before: DateTime<Utc>,
        priorities: &[RulePriority],
    ) -> Result<usize> {
        self.check()?;
        self.inner.prune_applications(before, priorities).await
    }

    async fn upsert_code_pattern(&self, pattern: CodePattern) -> Result<CodePattern> {
        self.check()?;
        self.inner.upsert_code_pattern(pattern).await
    }

    async fn list_code_patterns(&self) -> Result<Vec<CodePattern>> {
        self.check()?;
        self.inner.list_code_patterns().await
    }
}
