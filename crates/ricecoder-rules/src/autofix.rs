//! Structured auto-fix patterns.
//!
//! Rules store fixes in sed form (`s/search/replacement/flags`). The text is
//! parsed once into an [`AutoFix`] record; `\/` inside either half is a
//! literal slash.

use regex::{Regex, RegexBuilder};

use crate::error::{Result, RulesError};

/// A parsed `s/search/replacement/flags` fix
#[derive(Debug, Clone)]
pub struct AutoFix {
    search: Regex,
    /// Replacement in `regex` crate syntax (`${1}`, `$$`)
    replacement: String,
    global: bool,
}

impl AutoFix {
    /// Parse a sed-style substitution
    pub fn parse(spec: &str) -> Result<Self> {
        let body = spec
            .strip_prefix("s/")
            .ok_or_else(|| RulesError::InvalidAutoFix(format!("expected 's/' prefix: {}", spec)))?;

        let parts = split_unescaped(body);
        if parts.len() != 3 {
            return Err(RulesError::InvalidAutoFix(format!(
                "expected s/search/replacement/flags: {}",
                spec
            )));
        }

        let (search, replacement, flags) = (&parts[0], &parts[1], &parts[2]);
        if search.is_empty() {
            return Err(RulesError::InvalidAutoFix("empty search pattern".to_string()));
        }

        let mut global = false;
        let mut case_insensitive = false;
        for flag in flags.chars() {
            match flag {
                'g' => global = true,
                'i' => case_insensitive = true,
                other => {
                    return Err(RulesError::InvalidAutoFix(format!(
                        "unsupported flag '{}'",
                        other
                    )))
                }
            }
        }

        let search = RegexBuilder::new(search)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| RulesError::InvalidAutoFix(e.to_string()))?;

        Ok(Self {
            search,
            replacement: translate_replacement(replacement),
            global,
        })
    }

    /// Replacement line, or `None` when the search half does not match
    pub fn apply(&self, line: &str) -> Option<String> {
        if !self.search.is_match(line) {
            return None;
        }

        let fixed = if self.global {
            self.search.replace_all(line, self.replacement.as_str())
        } else {
            self.search.replace(line, self.replacement.as_str())
        };
        Some(fixed.into_owned())
    }
}

/// Split on `/`, treating `\/` as a literal slash
fn split_unescaped(body: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'/') => {
                chars.next();
                if let Some(p) = parts.last_mut() {
                    p.push('/');
                }
            }
            '/' => parts.push(String::new()),
            _ => {
                if let Some(p) = parts.last_mut() {
                    p.push(c);
                }
            }
        }
    }

    parts
}

/// Convert sed replacement syntax (`\1`, `&`) to `regex` syntax
fn translate_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(d) if d.is_ascii_digit() => {
                    out.push_str(&format!("${{{}}}", d));
                }
                Some('&') => out.push('&'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            '&' => out.push_str("${0}"),
            '$' => out.push_str("$$"),
            _ => out.push(c),
        }
    }

    out
}
