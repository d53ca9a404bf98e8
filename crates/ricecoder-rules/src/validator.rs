/// Validation applier: runs resolved rules against code content
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CompiledRule, RuleCache};
use crate::models::{RuleApplication, RuleCategory, RulePriority, RuleScope};
use crate::store::{RuleQuery, RuleStore};

/// One reported issue instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column, counted in characters
    pub column: u32,
    pub matched_text: String,
    pub message: String,
    pub suggestion: Option<String>,
    /// Suggested replacement for the whole line
    pub fix: Option<String>,
    pub category: RuleCategory,
    pub priority: RulePriority,
    pub scope: RuleScope,
}

/// Statistics about one validation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    /// Rules whose matcher ran
    pub rules_applied: usize,
    /// Rules skipped because their pattern did not compile
    pub rules_skipped: usize,
    pub findings: usize,
    pub duration_ms: f64,
    pub cache_hit: bool,
}

/// Findings grouped by priority
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub suggestions: Vec<Finding>,
    pub stats: ValidationStats,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Every finding in report order: errors, then warnings, then suggestions
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .chain(self.suggestions.iter())
    }

    fn push(&mut self, finding: Finding) {
        match finding.priority {
            RulePriority::Error => self.errors.push(finding),
            RulePriority::Warning => self.warnings.push(finding),
            RulePriority::Suggestion => self.suggestions.push(finding),
        }
    }
}

/// Applies cached rule sets to content and records the outcomes
pub struct ValidationApplier {
    cache: Arc<RuleCache>,
    store: Arc<dyn RuleStore>,
}

impl ValidationApplier {
    pub fn new(cache: Arc<RuleCache>, store: Arc<dyn RuleStore>) -> Self {
        Self { cache, store }
    }

    /// Validate one file's content.
    ///
    /// Always returns a report: uncompilable rules are skipped and recording
    /// failures are only logged.
    pub async fn validate(
        &self,
        content: &str,
        file_path: &str,
        client_name: Option<&str>,
        project_path: Option<&str>,
        technologies: &[String],
    ) -> ValidationReport {
        let started = Instant::now();
        let query = RuleQuery::for_request(client_name, project_path, technologies);
        let resolved = self.cache.resolve(&query).await;

        let mut report = ValidationReport::default();
        let mut applications = Vec::new();

        for compiled in resolved.rule_set.rules() {
            let rule_started = Instant::now();
            let outcomes = match Self::apply_rule(compiled, content, &mut report) {
                Some(lines) => {
                    report.stats.rules_applied += 1;
                    lines
                }
                None => {
                    report.stats.rules_skipped += 1;
                    vec![(None, false)]
                }
            };
            let elapsed_ms = rule_started.elapsed().as_secs_f64() * 1000.0;

            for (line, success) in outcomes {
                let mut application =
                    RuleApplication::new(&compiled.rule.rule_id, file_path, line, success);
                application.project_path = query.project_path.clone();
                application.client_name = query.client_name.clone();
                application.execution_time_ms = elapsed_ms;
                applications.push(application);
            }
        }

        self.record_applications(applications).await;

        report.stats.findings =
            report.errors.len() + report.warnings.len() + report.suggestions.len();
        report.stats.cache_hit = resolved.cache_hit;
        report.stats.duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        debug!(
            file = %file_path,
            rules = report.stats.rules_applied,
            findings = report.stats.findings,
            cache_hit = report.stats.cache_hit,
            "Validation complete"
        );

        report
    }

    /// Run one rule; `None` when it has no matcher.
    ///
    /// Returns the application outcomes: one success per matched line, or a
    /// single failure when nothing matched.
    fn apply_rule(
        compiled: &CompiledRule,
        content: &str,
        report: &mut ValidationReport,
    ) -> Option<Vec<(Option<u32>, bool)>> {
        let matcher = compiled.matcher.as_ref()?;
        let rule = &compiled.rule;

        let mut matched_lines = BTreeSet::new();
        for m in matcher.find_matches(content) {
            matched_lines.insert(m.line);
            report.push(Finding {
                rule_id: rule.rule_id.clone(),
                line: m.line,
                column: m.column,
                fix: compiled
                    .auto_fix
                    .as_ref()
                    .and_then(|fix| fix.apply(&m.line_text)),
                matched_text: m.text,
                message: rule.message.clone(),
                suggestion: rule.suggestion.clone(),
                category: rule.category,
                priority: rule.priority,
                scope: rule.scope,
            });
        }

        if matched_lines.is_empty() {
            Some(vec![(None, false)])
        } else {
            Some(matched_lines.into_iter().map(|l| (Some(l), true)).collect())
        }
    }

    async fn record_applications(&self, applications: Vec<RuleApplication>) {
        let results = join_all(
            applications
                .into_iter()
                .map(|application| self.store.record_application(application)),
        )
        .await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if let Some(Err(e)) = results.into_iter().find(|r| r.is_err()) {
            warn!(failures, error = %e, "Failed to record rule applications");
        }
    }
}
