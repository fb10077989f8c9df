//! Child-process environment construction.
//!
//! The launcher never relies on the ambient process environment. Callers
//! capture a base environment once, layer their overrides on top with
//! [`build_child_env`], and pass the result explicitly to the spawn call.

use std::collections::BTreeMap;

/// Full environment for a child process, ordered for stable logging.
pub type ChildEnv = BTreeMap<String, String>;

/// Value prefixes recognised as GitHub personal access tokens.
const GITHUB_TOKEN_PREFIXES: [&str; 2] = ["ghp_", "github_pat_"];

/// Merge `overrides` on top of `base`.
///
/// Every variable in `base` survives unless an override replaces it; later
/// overrides win over earlier ones.
pub fn build_child_env<I, K, V>(base: I, overrides: &[(String, String)]) -> ChildEnv
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut env: ChildEnv = base
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    env
}

/// Overrides that guarantee each named credential is defined in the child.
///
/// Credentials present in `base` are forwarded unchanged; missing ones are
/// set to the empty string so scripts can probe them without a `KeyError`.
pub fn credential_overrides(base: &ChildEnv, names: &[String]) -> Vec<(String, String)> {
    names
        .iter()
        .map(|name| {
            let value = base.get(name).cloned().unwrap_or_default();
            (name.clone(), value)
        })
        .collect()
}

/// Whether any of the named credentials holds a GitHub token.
pub fn has_github_token(env: &ChildEnv, names: &[String]) -> bool {
    names.iter().filter_map(|name| env.get(name)).any(|value| {
        GITHUB_TOKEN_PREFIXES
            .iter()
            .any(|prefix| value.starts_with(prefix))
    })
}
