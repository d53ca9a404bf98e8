//! Pattern compilation and the process-lifetime matcher cache

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::error::{Result, RulesError};
use crate::models::{PatternType, RulePattern};

/// One match of a matcher inside a piece of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// 1-based line number
    pub line: u32,
    /// 1-based column, counted in characters
    pub column: u32,
    pub text: String,
    /// Full text of the matched line
    pub line_text: String,
}

/// Executable form of a stored pattern.
///
/// Immutable once built. Matching keeps no cursor state, so one instance can
/// be shared across concurrent validations.
#[derive(Debug)]
pub struct CompiledMatcher {
    pattern: RulePattern,
    regex: Regex,
}

impl CompiledMatcher {
    pub fn pattern(&self) -> &RulePattern {
        &self.pattern
    }

    /// Scan content line by line and return every match
    pub fn find_matches(&self, content: &str) -> Vec<LineMatch> {
        let mut matches = Vec::new();

        for (index, line) in content.lines().enumerate() {
            for m in self.regex.find_iter(line) {
                matches.push(LineMatch {
                    line: index as u32 + 1,
                    column: line[..m.start()].chars().count() as u32 + 1,
                    text: m.as_str().to_string(),
                    line_text: line.to_string(),
                });
            }
        }

        matches
    }
}

/// Compiles stored patterns and caches matchers by `(text, type)`
#[derive(Default)]
pub struct PatternCompiler {
    cache: RwLock<HashMap<(String, PatternType), Arc<CompiledMatcher>>>,
}

impl PatternCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a pattern, reusing a previously built matcher when possible
    pub fn compile(&self, pattern: &RulePattern) -> Result<Arc<CompiledMatcher>> {
        let key = (pattern.text.clone(), pattern.pattern_type);

        if let Some(matcher) = self.cache.read().get(&key) {
            return Ok(Arc::clone(matcher));
        }

        let matcher = Arc::new(Self::build(pattern)?);

        let mut cache = self.cache.write();
        // Another thread may have raced us here; keep the first instance.
        let entry = cache.entry(key).or_insert_with(|| {
            debug!(pattern = %pattern.text, "Compiled rule pattern");
            matcher
        });
        Ok(Arc::clone(entry))
    }

    /// Compile, logging and discarding failures
    pub fn try_compile(&self, pattern: &RulePattern) -> Option<Arc<CompiledMatcher>> {
        match self.compile(pattern) {
            Ok(matcher) => Some(matcher),
            Err(e) => {
                warn!(pattern = %pattern.text, error = %e, "Skipping uncompilable pattern");
                None
            }
        }
    }

    /// Number of cached matchers
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    fn build(pattern: &RulePattern) -> Result<CompiledMatcher> {
        match pattern.pattern_type {
            PatternType::Regex => {
                let regex = RegexBuilder::new(&pattern.text)
                    .multi_line(true)
                    .build()
                    .map_err(|e| RulesError::PatternCompileFailed {
                        pattern: pattern.text.clone(),
                        message: e.to_string(),
                    })?;
                Ok(CompiledMatcher {
                    pattern: pattern.clone(),
                    regex,
                })
            }
        }
    }
}
