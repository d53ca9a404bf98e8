//! Aggregate learning metrics for dashboards and reports

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::RuleStore;

/// Snapshot of the rule base and its measured outcomes.
///
/// `avg_success_rate` and `avg_confidence` are independent figures; either is
/// `None` when there is nothing to average.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub total_rules: usize,
    pub active_rules: usize,
    /// Active rules per scope name
    pub rules_by_scope: BTreeMap<String, usize>,
    pub total_applications: u64,
    pub successful_applications: u64,
    /// Successful applications over all applications
    pub avg_success_rate: Option<f64>,
    /// Mean confidence of learned code patterns
    pub avg_confidence: Option<f64>,
    pub patterns_tracked: usize,
}

impl LearningMetrics {
    pub async fn collect(store: &dyn RuleStore) -> Result<Self> {
        let rules = store.all_rules().await?;
        let totals = store.application_totals().await?;
        let patterns = store.list_code_patterns().await?;

        let mut rules_by_scope = BTreeMap::new();
        for rule in rules.iter().filter(|r| r.is_active) {
            *rules_by_scope.entry(rule.scope.to_string()).or_insert(0) += 1;
        }

        let avg_success_rate = (totals.applications > 0)
            .then(|| totals.successes as f64 / totals.applications as f64);
        let avg_confidence = (!patterns.is_empty()).then(|| {
            patterns.iter().map(|p| p.confidence).sum::<f64>() / patterns.len() as f64
        });

        Ok(Self {
            total_rules: rules.len(),
            active_rules: rules.iter().filter(|r| r.is_active).count(),
            rules_by_scope,
            total_applications: totals.applications,
            successful_applications: totals.successes,
            avg_success_rate,
            avg_confidence,
            patterns_tracked: patterns.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CodePattern, RuleApplication, RuleCategory, RulePattern, RulePriority, RuleScope,
        ValidationRule,
    };
    use crate::store::InMemoryRuleStore;

    #[tokio::test]
    async fn test_empty_store_has_no_averages() {
        let store = InMemoryRuleStore::new();
        let metrics = LearningMetrics::collect(&store).await.unwrap();
        assert_eq!(metrics.total_rules, 0);
        assert_eq!(metrics.avg_success_rate, None);
        assert_eq!(metrics.avg_confidence, None);
    }

    #[tokio::test]
    async fn test_success_rate_does_not_stand_in_for_confidence() {
        let store = InMemoryRuleStore::new();
        let rule = ValidationRule::new(
            RulePattern::regex("x"),
            RuleCategory::Style,
            "javascript",
            RuleScope::Project,
            RulePriority::Warning,
            "m",
        );
        let id = rule.rule_id.clone();
        store.insert_rule(rule).await.unwrap();
        store
            .record_application(RuleApplication::new(&id, "a.js", Some(1), true))
            .await
            .unwrap();
        store
            .record_application(RuleApplication::new(&id, "a.js", None, false))
            .await
            .unwrap();

        let metrics = LearningMetrics::collect(&store).await.unwrap();
        assert_eq!(metrics.avg_success_rate, Some(0.5));
        assert_eq!(metrics.avg_confidence, None);
        assert_eq!(metrics.rules_by_scope.get("project"), Some(&1));

        store
            .upsert_code_pattern(CodePattern::new(
                "x",
                RuleCategory::Style,
                serde_json::json!({}),
                0.9,
            ))
            .await
            .unwrap();
        let metrics = LearningMetrics::collect(&store).await.unwrap();
        assert_eq!(metrics.avg_confidence, Some(0.9));
        assert_eq!(metrics.patterns_tracked, 1);
    }
}
