/// Integration tests for scope promotion and demotion
use std::sync::Arc;

use ricecoder_rules::{
    InMemoryRuleStore, RuleApplication, RuleCategory, RulePattern, RulePriority, RuleScope,
    RuleStore, RulesError, ScopeChange, ValidationRule, ValidationRuleManager,
};

const PROJECT: &str = "/work/storefront";

async fn seeded_rule(store: &InMemoryRuleStore, scope: RuleScope, applications: usize) -> String {
    let rule = ValidationRule::new(
        RulePattern::regex(r"console\.log"),
        RuleCategory::Style,
        "javascript",
        scope,
        RulePriority::Warning,
        "Remove console.log",
    )
    .with_effectiveness(0.9)
    .with_confidence(0.85)
    .learned_from(PROJECT);
    let rule_id = rule.rule_id.clone();
    store.insert_rule(rule).await.unwrap();

    for line in 0..applications {
        store
            .record_application(RuleApplication::new(
                &rule_id,
                "src/cart.js",
                Some(line as u32 + 1),
                true,
            ))
            .await
            .unwrap();
    }

    rule_id
}

#[tokio::test]
async fn test_effective_project_rule_promotes_to_client() {
    let store = Arc::new(InMemoryRuleStore::new());
    let rule_id = seeded_rule(&store, RuleScope::Project, 5).await;
    let manager = ValidationRuleManager::new(store.clone());

    let report = manager.propagate_effective_rules().await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.promoted.len(), 1);
    assert_eq!(report.promoted[0].source_scope, RuleScope::Project);
    assert_eq!(report.promoted[0].target_scope, RuleScope::Client);

    let rule = store.get_rule(&rule_id).await.unwrap().unwrap();
    assert_eq!(rule.scope, RuleScope::Client);

    let history = manager.promotion_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].change, ScopeChange::Promoted);
    assert_eq!(history[0].applications, 5);
}

#[tokio::test]
async fn test_too_few_applications_blocks_promotion() {
    let store = Arc::new(InMemoryRuleStore::new());
    let rule_id = seeded_rule(&store, RuleScope::Project, 4).await;
    let manager = ValidationRuleManager::new(store.clone());

    let report = manager.propagate_effective_rules().await.unwrap();

    assert_eq!(report.examined, 1);
    assert!(report.promoted.is_empty());
    let rule = store.get_rule(&rule_id).await.unwrap().unwrap();
    assert_eq!(rule.scope, RuleScope::Project);
}

#[tokio::test]
async fn test_low_success_rate_blocks_promotion() {
    let store = Arc::new(InMemoryRuleStore::new());
    let rule_id = seeded_rule(&store, RuleScope::Project, 5).await;
    for _ in 0..5 {
        store
            .record_application(RuleApplication::new(&rule_id, "src/a.js", None, false))
            .await
            .unwrap();
    }
    let manager = ValidationRuleManager::new(store.clone());

    let report = manager.propagate_effective_rules().await.unwrap();

    assert!(report.promoted.is_empty());
}

#[tokio::test]
async fn test_promotion_moves_one_rung_per_pass() {
    let store = Arc::new(InMemoryRuleStore::new());
    let rule_id = seeded_rule(&store, RuleScope::Project, 12).await;
    let manager = ValidationRuleManager::new(store.clone());

    manager.propagate_effective_rules().await.unwrap();
    assert_eq!(
        store.get_rule(&rule_id).await.unwrap().unwrap().scope,
        RuleScope::Client
    );

    manager.propagate_effective_rules().await.unwrap();
    assert_eq!(
        store.get_rule(&rule_id).await.unwrap().unwrap().scope,
        RuleScope::Organization
    );

    // Organization rules are not promotion candidates by default.
    let report = manager.propagate_effective_rules().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(manager.promotion_history().len(), 2);
}

#[tokio::test]
async fn test_promotion_invalidates_cached_rules() {
    let store = Arc::new(InMemoryRuleStore::new());
    seeded_rule(&store, RuleScope::Project, 5).await;
    let manager = ValidationRuleManager::new(store.clone());
    let technologies = vec!["javascript".to_string()];

    let before = manager
        .get_rules_for_scope(Some("acme"), Some("/work/other"), &technologies)
        .await;
    assert!(before.is_empty());

    manager.propagate_effective_rules().await.unwrap();

    // Client rules reach every project of the client.
    let after = manager
        .get_rules_for_scope(Some("acme"), Some("/work/other"), &technologies)
        .await;
    assert_eq!(after.len(), 1);
    assert_eq!(after.rules()[0].rule.scope, RuleScope::Client);
    assert_eq!(store.list_calls(), 2);
}

#[tokio::test]
async fn test_demote_moves_one_rung_narrower() {
    let store = Arc::new(InMemoryRuleStore::new());
    let rule_id = seeded_rule(&store, RuleScope::Organization, 0).await;
    let manager = ValidationRuleManager::new(store.clone());

    let entry = manager.demote_rule(&rule_id).await.unwrap();

    assert_eq!(entry.change, ScopeChange::Demoted);
    assert_eq!(entry.target_scope, RuleScope::Client);
    assert_eq!(
        store.get_rule(&rule_id).await.unwrap().unwrap().scope,
        RuleScope::Client
    );
}

#[tokio::test]
async fn test_demote_rejects_project_rules_and_unknown_ids() {
    let store = Arc::new(InMemoryRuleStore::new());
    let rule_id = seeded_rule(&store, RuleScope::Project, 0).await;
    let manager = ValidationRuleManager::new(store);

    assert!(matches!(
        manager.demote_rule(&rule_id).await,
        Err(RulesError::RulePromotionFailed(_))
    ));
    assert!(matches!(
        manager.demote_rule("missing").await,
        Err(RulesError::RuleNotFound(_))
    ));
}
