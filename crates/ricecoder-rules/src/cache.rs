//! Time-bound cache of resolved and compiled rule sets

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::autofix::AutoFix;
use crate::compiler::{CompiledMatcher, PatternCompiler};
use crate::models::{sort_by_precedence, ValidationRule};
use crate::store::{RuleQuery, RuleStore};

/// A rule paired with its executable matcher
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: ValidationRule,
    /// `None` when the pattern failed to compile
    pub matcher: Option<Arc<CompiledMatcher>>,
    pub auto_fix: Option<Arc<AutoFix>>,
    pub compile_error: Option<String>,
}

impl CompiledRule {
    pub fn compile(rule: ValidationRule, compiler: &PatternCompiler) -> Self {
        let (matcher, compile_error) = match compiler.compile(&rule.pattern) {
            Ok(matcher) => (Some(matcher), None),
            Err(e) => {
                warn!(rule_id = %rule.rule_id, error = %e, "Rule pattern failed to compile");
                (None, Some(e.to_string()))
            }
        };

        let auto_fix = rule
            .auto_fix_pattern
            .as_deref()
            .and_then(|spec| match AutoFix::parse(spec) {
                Ok(fix) => Some(Arc::new(fix)),
                Err(e) => {
                    warn!(rule_id = %rule.rule_id, error = %e, "Ignoring invalid auto-fix");
                    None
                }
            });

        Self {
            rule,
            matcher,
            auto_fix,
            compile_error,
        }
    }
}

/// Ordered rules resolved for one cache key
#[derive(Debug, Default)]
pub struct CompiledRuleSet {
    rules: Vec<CompiledRule>,
}

impl CompiledRuleSet {
    /// Compile rules, putting them into precedence order
    pub fn build(mut rules: Vec<ValidationRule>, compiler: &PatternCompiler) -> Self {
        sort_by_precedence(&mut rules);
        Self {
            rules: rules
                .into_iter()
                .map(|rule| CompiledRule::compile(rule, compiler))
                .collect(),
        }
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Outcome of a cache lookup
#[derive(Debug, Clone)]
pub struct ResolvedRules {
    pub rule_set: Arc<CompiledRuleSet>,
    pub cache_hit: bool,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    /// Refreshes that fell back to stale or empty results
    pub refresh_failures: u64,
    pub entry_count: usize,
}

impl CacheStats {
    /// Hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct CacheEntry {
    rule_set: Arc<CompiledRuleSet>,
    fetched_at: Instant,
}

/// Read-only, time-limited copy of resolved rule sets.
///
/// Never the source of truth: a miss always goes back to the store. Any write
/// to the store must be followed by [`RuleCache::invalidate`].
pub struct RuleCache {
    store: Arc<dyn RuleStore>,
    compiler: Arc<PatternCompiler>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Bumped on every invalidation; fetches started under an older
    /// generation are not inserted.
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    refresh_failures: AtomicU64,
}

impl RuleCache {
    pub fn new(store: Arc<dyn RuleStore>, compiler: Arc<PatternCompiler>, ttl: Duration) -> Self {
        Self {
            store,
            compiler,
            ttl,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            refresh_failures: AtomicU64::new(0),
        }
    }

    /// Order-sensitive key over scopes, technologies, client and project
    pub fn cache_key(query: &RuleQuery) -> String {
        let scopes: Vec<&str> = query.scopes.iter().map(|s| s.as_str()).collect();
        format!(
            "{}|{}|{}|{}",
            scopes.join(","),
            query.technologies.join(","),
            query.client_name.as_deref().unwrap_or(""),
            query.project_path.as_deref().unwrap_or("")
        )
    }

    /// Resolve the compiled rule set for a query.
    ///
    /// Never fails: a store error serves the stale entry for the key if one
    /// exists, otherwise an empty set.
    pub async fn resolve(&self, query: &RuleQuery) -> ResolvedRules {
        let key = Self::cache_key(query);

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key) {
                if entry.fetched_at.elapsed() < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Rule cache hit");
                    return ResolvedRules {
                        rule_set: Arc::clone(&entry.rule_set),
                        cache_hit: true,
                    };
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.generation.load(Ordering::SeqCst);

        match self.store.list_rules(query).await {
            Ok(rules) => {
                let rule_set = Arc::new(CompiledRuleSet::build(rules, &self.compiler));
                debug!(key = %key, rules = rule_set.len(), "Rule cache refreshed");

                let mut entries = self.entries.write().await;
                if self.generation.load(Ordering::SeqCst) == generation {
                    entries.insert(
                        key,
                        CacheEntry {
                            rule_set: Arc::clone(&rule_set),
                            fetched_at: Instant::now(),
                        },
                    );
                }

                ResolvedRules {
                    rule_set,
                    cache_hit: false,
                }
            }
            Err(e) => {
                self.refresh_failures.fetch_add(1, Ordering::Relaxed);
                let entries = self.entries.read().await;
                let rule_set = match entries.get(&key) {
                    Some(stale) => {
                        warn!(key = %key, error = %e, "Rule store unavailable, serving stale rules");
                        Arc::clone(&stale.rule_set)
                    }
                    None => {
                        warn!(key = %key, error = %e, "Rule store unavailable, validating without rules");
                        Arc::new(CompiledRuleSet::default())
                    }
                };

                ResolvedRules {
                    rule_set,
                    cache_hit: false,
                }
            }
        }
    }

    /// Drop every entry in one swap
    pub async fn invalidate(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *entries = HashMap::new();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!("Rule cache invalidated");
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            entry_count: self.entries.read().await.len(),
        }
    }
}
