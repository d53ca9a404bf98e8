/// Effectiveness-driven promotion of rules along the scope ladder
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PromotionThresholds;
use crate::error::{Result, RulesError};
use crate::models::{AggregatedRule, RuleScope};
use crate::store::{EffectivenessFilter, RuleStore};

/// Direction of a scope change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeChange {
    Promoted,
    Demoted,
}

/// Record of one scope change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionHistoryEntry {
    pub rule_id: String,
    pub source_scope: RuleScope,
    pub target_scope: RuleScope,
    pub change: ScopeChange,
    pub applications: u64,
    pub successes: u64,
    pub changed_at: DateTime<Utc>,
}

/// Outcome of one promotion pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionReport {
    /// Candidates returned by the aggregation query
    pub examined: usize,
    pub promoted: Vec<PromotionHistoryEntry>,
}

/// Promotes rules whose measured outcomes clear the configured thresholds.
///
/// There is no automatic demotion: falling effectiveness only stops further
/// promotion. Demotion is an explicit call.
pub struct PromotionEngine {
    thresholds: PromotionThresholds,
    history: Mutex<Vec<PromotionHistoryEntry>>,
}

impl PromotionEngine {
    pub fn new(thresholds: PromotionThresholds) -> Self {
        Self {
            thresholds,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn thresholds(&self) -> &PromotionThresholds {
        &self.thresholds
    }

    /// Aggregation filter selecting promotion candidates
    pub fn candidate_filter(&self) -> EffectivenessFilter {
        EffectivenessFilter {
            scopes: self.thresholds.candidate_scopes.clone(),
            min_effectiveness: self.thresholds.candidate_min_effectiveness,
            min_confidence: self.thresholds.candidate_min_confidence,
            min_applications: self.thresholds.auto_learn_threshold,
        }
    }

    /// Target scope for a candidate, or `None` to leave it where it is
    pub fn evaluate(&self, candidate: &AggregatedRule) -> Option<RuleScope> {
        let rule = &candidate.rule;
        if rule.effectiveness_score < self.thresholds.min_effectiveness
            || candidate.success_rate() < self.thresholds.min_success_rate
        {
            return None;
        }

        let required = self.thresholds.required_applications(rule.scope)?;
        if candidate.applications < required {
            return None;
        }

        rule.scope.next()
    }

    /// Run one promotion pass against the store.
    ///
    /// Store failures propagate; rules promoted before the failure stay
    /// promoted.
    pub async fn run(&self, store: &dyn RuleStore) -> Result<PromotionReport> {
        let candidates = store.aggregate_effectiveness(&self.candidate_filter()).await?;
        let mut report = PromotionReport {
            examined: candidates.len(),
            promoted: Vec::new(),
        };

        for candidate in &candidates {
            let Some(target) = self.evaluate(candidate) else {
                debug!(
                    rule_id = %candidate.rule.rule_id,
                    applications = candidate.applications,
                    success_rate = candidate.success_rate(),
                    "Rule not ready for promotion"
                );
                continue;
            };

            store.set_scope(&candidate.rule.rule_id, target).await?;
            info!(
                rule_id = %candidate.rule.rule_id,
                from = %candidate.rule.scope,
                to = %target,
                "Promoted rule"
            );

            let entry = PromotionHistoryEntry {
                rule_id: candidate.rule.rule_id.clone(),
                source_scope: candidate.rule.scope,
                target_scope: target,
                change: ScopeChange::Promoted,
                applications: candidate.applications,
                successes: candidate.successes,
                changed_at: Utc::now(),
            };
            self.history.lock().push(entry.clone());
            report.promoted.push(entry);
        }

        Ok(report)
    }

    /// Move a rule one rung narrower
    pub async fn demote(
        &self,
        store: &dyn RuleStore,
        rule_id: &str,
    ) -> Result<PromotionHistoryEntry> {
        let rule = store
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| RulesError::RuleNotFound(rule_id.to_string()))?;

        let target = rule.scope.previous().ok_or_else(|| {
            RulesError::RulePromotionFailed(format!(
                "Rule '{}' is already at {} scope",
                rule_id, rule.scope
            ))
        })?;

        store.set_scope(rule_id, target).await?;
        info!(rule_id = %rule_id, from = %rule.scope, to = %target, "Demoted rule");

        let entry = PromotionHistoryEntry {
            rule_id: rule_id.to_string(),
            source_scope: rule.scope,
            target_scope: target,
            change: ScopeChange::Demoted,
            applications: 0,
            successes: 0,
            changed_at: Utc::now(),
        };
        self.history.lock().push(entry.clone());
        Ok(entry)
    }

    /// Scope changes made by this engine, oldest first
    pub fn history(&self) -> Vec<PromotionHistoryEntry> {
        self.history.lock().clone()
    }
}

impl Default for PromotionEngine {
    fn default() -> Self {
        Self::new(PromotionThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RuleCategory, RulePattern, RulePriority, ValidationRule};

    fn candidate(scope: RuleScope, applications: u64, successes: u64) -> AggregatedRule {
        AggregatedRule {
            rule: ValidationRule::new(
                RulePattern::regex("x"),
                RuleCategory::General,
                "javascript",
                scope,
                RulePriority::Warning,
                "m",
            )
            .with_effectiveness(0.9)
            .with_confidence(0.85),
            applications,
            successes,
        }
    }

    #[test]
    fn test_ladder_thresholds() {
        let engine = PromotionEngine::default();
        assert_eq!(
            engine.evaluate(&candidate(RuleScope::Project, 5, 5)),
            Some(RuleScope::Client)
        );
        assert_eq!(engine.evaluate(&candidate(RuleScope::Project, 4, 4)), None);
        assert_eq!(engine.evaluate(&candidate(RuleScope::Client, 9, 9)), None);
        assert_eq!(
            engine.evaluate(&candidate(RuleScope::Client, 10, 10)),
            Some(RuleScope::Organization)
        );
        assert_eq!(
            engine.evaluate(&candidate(RuleScope::Organization, 20, 20)),
            Some(RuleScope::Global)
        );
        assert_eq!(engine.evaluate(&candidate(RuleScope::Global, 100, 100)), None);
    }

    #[test]
    fn test_success_rate_gate() {
        let engine = PromotionEngine::default();
        // 3 of 5 is 0.6, below 0.7
        assert_eq!(engine.evaluate(&candidate(RuleScope::Project, 5, 3)), None);
        // 7 of 10 is exactly 0.7
        assert_eq!(
            engine.evaluate(&candidate(RuleScope::Project, 10, 7)),
            Some(RuleScope::Client)
        );
    }

    #[test]
    fn test_effectiveness_gate() {
        let engine = PromotionEngine::default();
        let mut c = candidate(RuleScope::Project, 6, 6);
        c.rule.effectiveness_score = 0.75;
        assert_eq!(engine.evaluate(&c), None);
    }

    #[test]
    fn test_candidate_filter_uses_thresholds() {
        let engine = PromotionEngine::default();
        let filter = engine.candidate_filter();
        assert_eq!(filter.scopes, vec![RuleScope::Project, RuleScope::Client]);
        assert_eq!(filter.min_applications, 3);
        assert_eq!(filter.min_effectiveness, 0.7);
        assert_eq!(filter.min_confidence, 0.8);
    }
}
