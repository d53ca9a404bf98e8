/// Validation rule manager: the engine's public entry point
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::cache::{CacheStats, CompiledRuleSet, RuleCache};
use crate::compiler::PatternCompiler;
use crate::config::EngineConfig;
use crate::error::{Result, RulesError};
use crate::extractor::PatternExtractor;
use crate::metrics::LearningMetrics;
use crate::models::{CodePattern, ErrorDetails, LearningContext, RulePattern, ValidationRule};
use crate::promotion::{PromotionEngine, PromotionHistoryEntry, PromotionReport};
use crate::store::{InMemoryRuleStore, RuleQuery, RuleStore};
use crate::validator::{ValidationApplier, ValidationReport};

/// Owns one rule cache and one compiler cache over a rule store.
///
/// Independent managers never share cached state.
pub struct ValidationRuleManager {
    config: EngineConfig,
    store: Arc<dyn RuleStore>,
    cache: Arc<RuleCache>,
    applier: ValidationApplier,
    extractor: PatternExtractor,
    promoter: PromotionEngine,
}

impl ValidationRuleManager {
    /// Create a manager with default configuration
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn RuleStore>, config: EngineConfig) -> Self {
        let compiler = Arc::new(PatternCompiler::new());
        let cache = Arc::new(RuleCache::new(
            Arc::clone(&store),
            compiler,
            config.cache_ttl(),
        ));

        Self {
            applier: ValidationApplier::new(Arc::clone(&cache), Arc::clone(&store)),
            extractor: PatternExtractor::new(),
            promoter: PromotionEngine::new(config.promotion.clone()),
            config,
            store,
            cache,
        }
    }

    /// Manager over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRuleStore::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// Validate code content against every rule that applies to it
    pub async fn validate(
        &self,
        content: &str,
        file_path: &str,
        client_name: Option<&str>,
        project_path: Option<&str>,
        technologies: &[String],
    ) -> ValidationReport {
        self.applier
            .validate(content, file_path, client_name, project_path, technologies)
            .await
    }

    /// Learn a rule from an error report.
    ///
    /// Returns `Ok(None)` when no heuristic recognises the error. A known
    /// `(pattern, technology)` pair bumps the existing rule instead of
    /// creating a second one. Store failures are returned to the caller.
    pub async fn learn_from_error(
        &self,
        error: &ErrorDetails,
        context: &LearningContext,
    ) -> Result<Option<String>> {
        let Some(extracted) = self.extractor.extract(error) else {
            debug!(message = %error.message, "No pattern extracted from error");
            return Ok(None);
        };

        let technology = context
            .technology
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(self.config.default_technology.as_str())
            .to_string();

        self.store
            .upsert_code_pattern(CodePattern::new(
                extracted.pattern.clone(),
                extracted.category,
                json!({
                    "message": error.message,
                    "file_path": error.file_path,
                    "line_number": error.line_number,
                    "project_path": context.project_path,
                    "client_name": context.client_name,
                    "technology": technology,
                }),
                extracted.confidence,
            ))
            .await?;

        if let Some(existing) = self
            .store
            .find_rule_by_pattern_and_technology(&extracted.pattern, &technology)
            .await?
        {
            let updated = self
                .store
                .update_rule_occurrence(&existing.rule_id, self.config.confidence_increment)
                .await?;
            self.cache.invalidate().await;
            info!(
                rule_id = %updated.rule_id,
                occurrences = updated.occurrences,
                confidence = updated.confidence,
                "Reinforced existing rule"
            );
            return Ok(Some(updated.rule_id));
        }

        let scope = extracted.initial_scope(context.client_name.as_deref());
        let mut rule = ValidationRule::new(
            RulePattern::regex(extracted.pattern),
            extracted.category,
            technology,
            scope,
            extracted.priority,
            extracted.message,
        )
        .with_confidence(extracted.confidence);
        rule.suggestion = extracted.suggestion;
        rule.auto_fix_pattern = extracted.auto_fix;
        rule.learned_from = context.project_path.clone();
        rule.client_name = context.client_name.clone();

        let rule_id = rule.rule_id.clone();
        self.store.insert_rule(rule).await?;
        self.cache.invalidate().await;
        info!(rule_id = %rule_id, scope = %scope, "Learned new rule");

        Ok(Some(rule_id))
    }

    /// Promote rules whose outcomes clear the promotion thresholds
    pub async fn propagate_effective_rules(&self) -> Result<PromotionReport> {
        let result = self.promoter.run(self.store.as_ref()).await;

        // A failed pass may still have promoted some rules.
        if result.as_ref().map_or(true, |report| !report.promoted.is_empty()) {
            self.cache.invalidate().await;
        }

        let report = result?;
        info!(
            examined = report.examined,
            promoted = report.promoted.len(),
            "Promotion pass complete"
        );
        Ok(report)
    }

    /// Compiled rules for a client/project, in precedence order
    pub async fn get_rules_for_scope(
        &self,
        client_name: Option<&str>,
        project_path: Option<&str>,
        technologies: &[String],
    ) -> Arc<CompiledRuleSet> {
        let query = RuleQuery::for_request(client_name, project_path, technologies);
        self.cache.resolve(&query).await.rule_set
    }

    /// Move a rule one rung narrower on the ladder
    pub async fn demote_rule(&self, rule_id: &str) -> Result<PromotionHistoryEntry> {
        let entry = self.promoter.demote(self.store.as_ref(), rule_id).await?;
        self.cache.invalidate().await;
        Ok(entry)
    }

    /// Stop applying a rule without deleting it
    pub async fn deactivate_rule(&self, rule_id: &str) -> Result<()> {
        self.store.set_active(rule_id, false).await?;
        self.cache.invalidate().await;
        info!(rule_id = %rule_id, "Deactivated rule");
        Ok(())
    }

    /// Store an externally computed effectiveness score
    pub async fn record_effectiveness(&self, rule_id: &str, score: f64) -> Result<()> {
        if !score.is_finite() {
            return Err(RulesError::InvalidValue(format!(
                "Effectiveness score for '{}' is not a number",
                rule_id
            )));
        }
        self.store.set_effectiveness(rule_id, score).await?;
        self.cache.invalidate().await;
        Ok(())
    }

    pub async fn learning_metrics(&self) -> Result<LearningMetrics> {
        LearningMetrics::collect(self.store.as_ref()).await
    }

    /// Drop low-severity applications older than the retention window
    pub async fn prune_applications(&self) -> Result<usize> {
        let cutoff = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(self.config.retention_days)))
            .ok_or_else(|| {
                RulesError::ConfigurationError(format!(
                    "retention_days {} reaches before the earliest representable date",
                    self.config.retention_days
                ))
            })?;
        let removed = self
            .store
            .prune_applications(cutoff, &self.config.prunable_priorities)
            .await?;
        if removed > 0 {
            info!(removed, "Pruned rule applications");
        }
        Ok(removed)
    }

    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn promotion_history(&self) -> Vec<PromotionHistoryEntry> {
        self.promoter.history()
    }
}
