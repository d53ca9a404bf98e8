/// Engine configuration and its project/user/default loading hierarchy
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, RulesError};
use crate::models::{RulePriority, RuleScope};

const CONFIG_DIR: &str = ".ricecoder";
const CONFIG_FILE: &str = "validation-rules.yaml";

/// Upper bound on `retention_days` (100 years)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Thresholds that gate promotion along the scope ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionThresholds {
    /// Scopes whose rules are considered for promotion
    pub candidate_scopes: Vec<RuleScope>,
    /// Candidates need an effectiveness score strictly above this
    pub candidate_min_effectiveness: f64,
    /// Candidates need a confidence strictly above this
    pub candidate_min_confidence: f64,
    /// Minimum applications before a rule is looked at at all
    pub auto_learn_threshold: u64,
    /// Effectiveness needed to actually promote
    pub min_effectiveness: f64,
    /// Success rate needed to actually promote
    pub min_success_rate: f64,
    pub project_to_client: u64,
    pub client_to_organization: u64,
    pub organization_to_global: u64,
}

impl Default for PromotionThresholds {
    fn default() -> Self {
        Self {
            candidate_scopes: vec![RuleScope::Project, RuleScope::Client],
            candidate_min_effectiveness: 0.7,
            candidate_min_confidence: 0.8,
            auto_learn_threshold: 3,
            min_effectiveness: 0.8,
            min_success_rate: 0.7,
            project_to_client: 5,
            client_to_organization: 10,
            organization_to_global: 20,
        }
    }
}

impl PromotionThresholds {
    /// Applications required to leave `from` for the next rung
    pub fn required_applications(&self, from: RuleScope) -> Option<u64> {
        match from {
            RuleScope::Project => Some(self.project_to_client),
            RuleScope::Client => Some(self.client_to_organization),
            RuleScope::Organization => Some(self.organization_to_global),
            RuleScope::Global => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("candidate_min_effectiveness", self.candidate_min_effectiveness),
            ("candidate_min_confidence", self.candidate_min_confidence),
            ("min_effectiveness", self.min_effectiveness),
            ("min_success_rate", self.min_success_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RulesError::ConfigurationError(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if self.candidate_scopes.contains(&RuleScope::Global) {
            return Err(RulesError::ConfigurationError(
                "global rules cannot be promotion candidates".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validation rule engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of a resolved rule set in the cache
    pub cache_ttl_secs: u64,
    /// Confidence added each time a known pattern is observed again
    pub confidence_increment: f64,
    /// Technology assumed when an error report does not name one
    pub default_technology: String,
    /// Applications older than this are eligible for pruning
    pub retention_days: u32,
    /// Priorities whose applications may be pruned
    pub prunable_priorities: Vec<RulePriority>,
    pub promotion: PromotionThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            confidence_increment: 0.05,
            default_technology: "javascript".to_string(),
            retention_days: 90,
            prunable_priorities: vec![RulePriority::Suggestion],
            promotion: PromotionThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs == 0 {
            return Err(RulesError::ConfigurationError(
                "cache_ttl_secs must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.confidence_increment) {
            return Err(RulesError::ConfigurationError(
                "confidence_increment must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.default_technology.trim().is_empty() {
            return Err(RulesError::ConfigurationError(
                "default_technology must not be empty".to_string(),
            ));
        }

        if self.retention_days == 0 || self.retention_days > MAX_RETENTION_DAYS {
            return Err(RulesError::ConfigurationError(format!(
                "retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }

        self.promotion.validate()
    }
}

/// Loads `EngineConfig` from project, then user, then defaults
pub struct EngineConfigLoader;

impl EngineConfigLoader {
    /// Load configuration for a project directory
    pub async fn load(project_root: impl AsRef<Path>) -> Result<EngineConfig> {
        let project_path = Self::project_config_path(project_root.as_ref());
        if let Some(config) = Self::load_from(&project_path).await? {
            return Ok(config);
        }

        if let Some(user_path) = Self::user_config_path() {
            if let Some(config) = Self::load_from(&user_path).await? {
                return Ok(config);
            }
        }

        Ok(EngineConfig::default())
    }

    /// Read one config file; `Ok(None)` when it does not exist
    pub async fn load_from(path: &Path) -> Result<Option<EngineConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            RulesError::ConfigurationError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: EngineConfig = serde_yaml::from_str(&content).map_err(|e| {
            RulesError::ConfigurationError(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(Some(config))
    }

    /// Save configuration to the project-level config file
    pub async fn save_project_config(
        project_root: impl AsRef<Path>,
        config: &EngineConfig,
    ) -> Result<()> {
        config.validate()?;

        let path = Self::project_config_path(project_root.as_ref());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let yaml = serde_yaml::to_string(config).map_err(|e| {
            RulesError::ConfigurationError(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(&path, yaml).await?;
        Ok(())
    }

    pub fn project_config_path(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}
