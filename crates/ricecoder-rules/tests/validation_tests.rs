/// Integration tests for validating content against stored rules
use std::sync::Arc;

use ricecoder_rules::{
    EngineConfig, InMemoryRuleStore, RuleCategory, RulePattern, RulePriority, RuleScope,
    RuleStore, ValidationRule, ValidationRuleManager,
};

mod support;
use support::FlakyRuleStore;

const PROJECT: &str = "/work/storefront";

fn javascript() -> Vec<String> {
    vec!["javascript".to_string()]
}

fn console_log_rule() -> ValidationRule {
    ValidationRule::new(
        RulePattern::regex(r"console\.log"),
        RuleCategory::Style,
        "javascript",
        RuleScope::Project,
        RulePriority::Warning,
        "Remove console.log before committing",
    )
    .learned_from(PROJECT)
}

#[tokio::test]
async fn test_console_log_reported_with_position() {
    let store = Arc::new(InMemoryRuleStore::new());
    store.insert_rule(console_log_rule()).await.unwrap();
    let manager = ValidationRuleManager::new(store);

    let report = manager
        .validate(
            "const total = 1;\nconsole.log(total);\n",
            "src/cart.js",
            None,
            Some(PROJECT),
            &javascript(),
        )
        .await;

    assert!(report.errors.is_empty());
    assert!(report.suggestions.is_empty());
    assert_eq!(report.warnings.len(), 1);

    let finding = &report.warnings[0];
    assert_eq!(finding.line, 2);
    assert_eq!(finding.column, 1);
    assert_eq!(finding.matched_text, "console.log");
    assert_eq!(finding.message, "Remove console.log before committing");
    assert_eq!(report.stats.findings, 1);
}

#[tokio::test]
async fn test_findings_grouped_by_priority() {
    let store = Arc::new(InMemoryRuleStore::new());
    store.insert_rule(console_log_rule()).await.unwrap();
    store
        .insert_rule(ValidationRule::new(
            RulePattern::regex(r"\beval\s*\("),
            RuleCategory::Security,
            "javascript",
            RuleScope::Global,
            RulePriority::Error,
            "Avoid eval",
        ))
        .await
        .unwrap();
    store
        .insert_rule(ValidationRule::new(
            RulePattern::regex(r"\bvar\b"),
            RuleCategory::Style,
            "javascript",
            RuleScope::Global,
            RulePriority::Suggestion,
            "Prefer let or const",
        ))
        .await
        .unwrap();
    let manager = ValidationRuleManager::new(store);

    let report = manager
        .validate(
            "var x = eval(input);\nconsole.log(x);",
            "src/app.js",
            None,
            Some(PROJECT),
            &javascript(),
        )
        .await;

    assert!(report.has_errors());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.suggestions.len(), 1);
    assert_eq!(report.errors[0].column, 9);
    assert_eq!(report.findings().count(), 3);
}

#[tokio::test]
async fn test_rules_from_other_technologies_are_ignored() {
    let store = Arc::new(InMemoryRuleStore::new());
    store.insert_rule(console_log_rule()).await.unwrap();
    let manager = ValidationRuleManager::new(store);

    let report = manager
        .validate(
            "console.log(1);",
            "main.py",
            None,
            Some(PROJECT),
            &["python".to_string()],
        )
        .await;

    assert_eq!(report.findings().count(), 0);
    assert_eq!(report.stats.rules_applied, 0);
}

#[tokio::test]
async fn test_project_rules_need_a_project() {
    let store = Arc::new(InMemoryRuleStore::new());
    store.insert_rule(console_log_rule()).await.unwrap();
    let manager = ValidationRuleManager::new(store);

    let report = manager
        .validate("console.log(1);", "a.js", None, None, &javascript())
        .await;
    assert_eq!(report.findings().count(), 0);

    let report = manager
        .validate("console.log(1);", "a.js", None, Some("/work/other"), &javascript())
        .await;
    assert_eq!(report.findings().count(), 0);
}

#[tokio::test]
async fn test_broken_pattern_is_skipped() {
    let store = Arc::new(InMemoryRuleStore::new());
    store.insert_rule(console_log_rule()).await.unwrap();
    store
        .insert_rule(ValidationRule::new(
            RulePattern::regex("(unclosed"),
            RuleCategory::General,
            "javascript",
            RuleScope::Global,
            RulePriority::Error,
            "broken",
        ))
        .await
        .unwrap();
    let manager = ValidationRuleManager::new(store);

    let report = manager
        .validate("console.log(1);", "a.js", None, Some(PROJECT), &javascript())
        .await;

    assert_eq!(report.stats.rules_applied, 1);
    assert_eq!(report.stats.rules_skipped, 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_auto_fix_suggests_replacement_line() {
    let store = Arc::new(InMemoryRuleStore::new());
    store
        .insert_rule(
            ValidationRule::new(
                RulePattern::regex(r"==[^=]"),
                RuleCategory::Style,
                "javascript",
                RuleScope::Global,
                RulePriority::Suggestion,
                "Use strict equality",
            )
            .with_auto_fix(r"s/([^=!])==([^=])/\1===\2/g"),
        )
        .await
        .unwrap();
    let manager = ValidationRuleManager::new(store);

    let report = manager
        .validate("if (a == b) {}", "a.js", None, None, &javascript())
        .await;

    assert_eq!(report.suggestions.len(), 1);
    assert_eq!(
        report.suggestions[0].fix.as_deref(),
        Some("if (a === b) {}")
    );
}

#[tokio::test]
async fn test_applications_recorded_per_matched_line() {
    let store = Arc::new(InMemoryRuleStore::new());
    let rule = console_log_rule();
    let rule_id = rule.rule_id.clone();
    store.insert_rule(rule).await.unwrap();
    let manager = ValidationRuleManager::new(store.clone());

    manager
        .validate(
            "console.log(1); console.log(2);\nlet a;\nconsole.log(a);",
            "a.js",
            Some("acme"),
            Some(PROJECT),
            &javascript(),
        )
        .await;

    let applications = store.applications().await;
    assert_eq!(applications.len(), 2);
    assert!(applications.iter().all(|a| a.success && a.rule_id == rule_id));
    assert_eq!(applications[0].client_name.as_deref(), Some("acme"));
    assert_eq!(applications[0].project_path.as_deref(), Some(PROJECT));

    manager
        .validate("let clean = true;", "b.js", None, Some(PROJECT), &javascript())
        .await;

    let applications = store.applications().await;
    assert_eq!(applications.len(), 3);
    assert!(!applications[2].success);
    assert_eq!(applications[2].line_number, None);
}

#[tokio::test]
async fn test_store_outage_without_cache_yields_empty_report() {
    let store = Arc::new(FlakyRuleStore::default());
    store.inner.insert_rule(console_log_rule()).await.unwrap();
    store.set_failing(true);
    let manager = ValidationRuleManager::new(store);

    let report = manager
        .validate("console.log(1);", "a.js", None, Some(PROJECT), &javascript())
        .await;

    assert_eq!(report.findings().count(), 0);
    assert_eq!(manager.cache_stats().await.refresh_failures, 1);
}

#[tokio::test]
async fn test_store_outage_serves_stale_rules() {
    let store = Arc::new(FlakyRuleStore::default());
    store.inner.insert_rule(console_log_rule()).await.unwrap();
    let mut config = EngineConfig::default();
    config.cache_ttl_secs = 0;
    let manager = ValidationRuleManager::with_config(store.clone(), config);

    let first = manager
        .validate("console.log(1);", "a.js", None, Some(PROJECT), &javascript())
        .await;
    assert_eq!(first.warnings.len(), 1);

    store.set_failing(true);
    let second = manager
        .validate("console.log(1);", "a.js", None, Some(PROJECT), &javascript())
        .await;

    assert_eq!(second.warnings.len(), 1);
    assert!(!second.stats.cache_hit);
}

#[tokio::test]
async fn test_recording_failure_does_not_fail_validation() {
    let store = Arc::new(FlakyRuleStore::default());
    store.inner.insert_rule(console_log_rule()).await.unwrap();
    let manager = ValidationRuleManager::new(store.clone());

    // Warm the cache so only recording hits the failing store.
    manager
        .validate("", "a.js", None, Some(PROJECT), &javascript())
        .await;
    store.set_failing(true);

    let report = manager
        .validate("console.log(1);", "a.js", None, Some(PROJECT), &javascript())
        .await;

    assert!(report.stats.cache_hit);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(store.inner.applications().await.len(), 1);
}
