use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

use super::memory::{merge_code_pattern, InMemoryRuleStore, RuleChange, StoreState};
use super::{ApplicationTotals, EffectivenessFilter, RuleQuery, RuleStore};
use crate::error::{Result, RulesError};
use crate::models::{
    AggregatedRule, CodePattern, RuleApplication, RulePriority, RuleScope, ValidationRule,
};

const RULES_DIR: &str = "rules";
const APPLICATIONS_FILE: &str = "applications.jsonl";
const PATTERNS_FILE: &str = "patterns.json";

/// Directory-backed `RuleStore`.
///
/// Rules live in `rules/<id>.json`, applications are appended to
/// `applications.jsonl` and code patterns are kept in `patterns.json`. Reads
/// are served from memory after the directory has been loaded once.
///
/// Every write reaches disk before memory, so a failed write leaves both
/// unchanged.
pub struct JsonFileRuleStore {
    root: PathBuf,
    inner: InMemoryRuleStore,
    /// Serialises read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileRuleStore {
    /// Open (or create) a store rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(RULES_DIR)).await.map_err(|e| {
            RulesError::StoreError(format!("Failed to create storage directory: {}", e))
        })?;

        let state = StoreState {
            rules: load_rules(&root.join(RULES_DIR)).await?,
            applications: load_applications(&root.join(APPLICATIONS_FILE)).await?,
            patterns: load_patterns(&root.join(PATTERNS_FILE)).await?,
        };
        debug!(
            root = %root.display(),
            rules = state.rules.len(),
            applications = state.applications.len(),
            "Opened rule store"
        );

        Ok(Self {
            root,
            inner: InMemoryRuleStore::from_state(state),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn rule_file_path(&self, rule_id: &str) -> PathBuf {
        self.root
            .join(RULES_DIR)
            .join(format!("{}.json", rule_file_stem(rule_id)))
    }

    async fn write_rule(&self, rule: &ValidationRule) -> Result<()> {
        let json = serde_json::to_string_pretty(rule)?;
        fs::write(self.rule_file_path(&rule.rule_id), json)
            .await
            .map_err(|e| RulesError::StoreError(format!("Failed to write rule file: {}", e)))
    }

    async fn write_patterns(&self, patterns: &HashMap<String, CodePattern>) -> Result<()> {
        let mut patterns: Vec<&CodePattern> = patterns.values().collect();
        patterns.sort_by(|a, b| a.signature.cmp(&b.signature));
        let json = serde_json::to_string_pretty(&patterns)?;
        fs::write(self.root.join(PATTERNS_FILE), json)
            .await
            .map_err(|e| RulesError::StoreError(format!("Failed to write patterns file: {}", e)))
    }

    async fn rewrite_applications(&self, applications: &[RuleApplication]) -> Result<()> {
        let mut out = String::new();
        for application in applications {
            out.push_str(&serde_json::to_string(application)?);
            out.push('\n');
        }
        fs::write(self.root.join(APPLICATIONS_FILE), out)
            .await
            .map_err(|e| {
                RulesError::StoreError(format!("Failed to rewrite applications file: {}", e))
            })
    }

    async fn commit_change(&self, rule_id: &str, change: RuleChange) -> Result<ValidationRule> {
        let _guard = self.write_lock.lock().await;
        let rule = self.inner.changed_rule(rule_id, change).await?;
        self.write_rule(&rule).await?;
        self.inner.put_rule(rule.clone()).await;
        Ok(rule)
    }
}

/// File stem for a rule id.
///
/// ASCII letters, digits, `-` and `_` are kept; every other byte becomes
/// `%XX`, so ids never escape the rules directory and never collide.
fn rule_file_stem(rule_id: &str) -> String {
    let mut stem = String::with_capacity(rule_id.len());
    for byte in rule_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

async fn load_rules(dir: &Path) -> Result<HashMap<String, ValidationRule>> {
    let mut rules = HashMap::new();
    let mut entries = fs::read_dir(dir).await.map_err(|e| {
        RulesError::StoreError(format!("Failed to read storage directory: {}", e))
    })?;

    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        RulesError::StoreError(format!("Failed to read directory entry: {}", e))
    })? {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }

        match fs::read_to_string(&path).await {
            Ok(json) => match serde_json::from_str::<ValidationRule>(&json) {
                Ok(rule) => {
                    rules.insert(rule.rule_id.clone(), rule);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable rule"),
            },
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read rule file"),
        }
    }

    Ok(rules)
}

async fn load_applications(path: &Path) -> Result<Vec<RuleApplication>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).await.map_err(|e| {
        RulesError::StoreError(format!("Failed to read applications file: {}", e))
    })?;

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(application) => Some(application),
            Err(e) => {
                warn!(error = %e, "Skipping malformed application record");
                None
            }
        })
        .collect())
}

async fn load_patterns(path: &Path) -> Result<HashMap<String, CodePattern>> {
    if !path.exists() {
        return Ok(Default::default());
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| RulesError::StoreError(format!("Failed to read patterns file: {}", e)))?;
    let patterns: Vec<CodePattern> = serde_json::from_str(&content)?;
    Ok(patterns
        .into_iter()
        .map(|p| (p.signature.clone(), p))
        .collect())
}

#[async_trait]
impl RuleStore for JsonFileRuleStore {
    async fn list_rules(&self, query: &RuleQuery) -> Result<Vec<ValidationRule>> {
        self.inner.list_rules(query).await
    }

    async fn all_rules(&self) -> Result<Vec<ValidationRule>> {
        self.inner.all_rules().await
    }

    async fn get_rule(&self, rule_id: &str) -> Result<Option<ValidationRule>> {
        self.inner.get_rule(rule_id).await
    }

    async fn find_rule_by_pattern_and_technology(
        &self,
        pattern: &str,
        technology: &str,
    ) -> Result<Option<ValidationRule>> {
        self.inner
            .find_rule_by_pattern_and_technology(pattern, technology)
            .await
    }

    async fn insert_rule(&self, rule: ValidationRule) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.inner.ensure_new_rule(&rule.rule_id).await?;
        self.write_rule(&rule).await?;
        self.inner.put_rule(rule).await;
        Ok(())
    }

    async fn update_rule_occurrence(
        &self,
        rule_id: &str,
        confidence_increment: f64,
    ) -> Result<ValidationRule> {
        self.commit_change(rule_id, RuleChange::Occurrence(confidence_increment))
            .await
    }

    async fn set_scope(&self, rule_id: &str, scope: RuleScope) -> Result<ValidationRule> {
        self.commit_change(rule_id, RuleChange::Scope(scope)).await
    }

    async fn set_active(&self, rule_id: &str, active: bool) -> Result<ValidationRule> {
        self.commit_change(rule_id, RuleChange::Active(active)).await
    }

    async fn set_effectiveness(&self, rule_id: &str, score: f64) -> Result<ValidationRule> {
        self.commit_change(rule_id, RuleChange::Effectiveness(score))
            .await
    }

    async fn record_application(&self, application: RuleApplication) -> Result<()> {
        let mut line = serde_json::to_string(&application)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(APPLICATIONS_FILE))
            .await
            .map_err(|e| {
                RulesError::StoreError(format!("Failed to open applications file: {}", e))
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            RulesError::StoreError(format!("Failed to append application: {}", e))
        })?;

        self.inner.record_application(application).await
    }

    async fn aggregate_effectiveness(
        &self,
        filter: &EffectivenessFilter,
    ) -> Result<Vec<AggregatedRule>> {
        self.inner.aggregate_effectiveness(filter).await
    }

    async fn application_totals(&self) -> Result<ApplicationTotals> {
        self.inner.application_totals().await
    }

    async fn prune_applications(
        &self,
        before: DateTime<Utc>,
        priorities: &[RulePriority],
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.inner.snapshot().await;
        let removed = state.prune_applications(before, priorities);
        if removed > 0 {
            self.rewrite_applications(&state.applications).await?;
            self.inner.set_applications(state.applications).await;
        }
        Ok(removed)
    }

    async fn upsert_code_pattern(&self, pattern: CodePattern) -> Result<CodePattern> {
        let _guard = self.write_lock.lock().await;
        let mut patterns = self.inner.patterns_snapshot().await;
        let stored = merge_code_pattern(&mut patterns, pattern);
        self.write_patterns(&patterns).await?;
        self.inner.set_patterns(patterns).await;
        Ok(stored)
    }

    async fn list_code_patterns(&self) -> Result<Vec<CodePattern>> {
        self.inner.list_code_patterns().await
    }
}
