/// Resolution of the scopes that apply to a validation request
use crate::models::RuleScope;

/// Computes the ordered list of applicable scopes
pub struct ScopeResolver;

impl ScopeResolver {
    /// Resolve scopes for an optional client and project.
    ///
    /// Always starts with `global`; a known client adds `organization` and
    /// `client`, a known project adds `project`. Blank names count as unknown.
    pub fn resolve(client_name: Option<&str>, project_path: Option<&str>) -> Vec<RuleScope> {
        let mut scopes = vec![RuleScope::Global];

        if is_known(client_name) {
            scopes.push(RuleScope::Organization);
            scopes.push(RuleScope::Client);
        }

        if is_known(project_path) {
            scopes.push(RuleScope::Project);
        }

        scopes
    }
}

fn is_known(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}
