//! Environment assembly for a task invocation, per `SPEC_FULL.md` §6:
//! validate variable names, extend `PATH` with a project `bin/`
//! directory when one is configured, and warn (rather than fail) on
//! values that don't qualify.

use std::collections::BTreeMap;

use camino::Utf8Path;
use tracing::warn;

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Build the environment for a task: start from `base`, drop invalid
/// names, warn on empty values, and prepend `bin_dir` to `PATH` if one
/// is configured.
pub fn assemble_env(
    base: &BTreeMap<String, String>,
    bin_dir: Option<&Utf8Path>,
    strict: bool,
) -> Result<BTreeMap<String, String>, EnvError> {
    let mut env = BTreeMap::new();
    for (name, value) in base {
        if !is_valid_name(name) {
            if strict {
                return Err(EnvError::InvalidName(name.clone()));
            }
            warn!(%name, "dropping environment variable with an invalid name");
            continue;
        }
        if value.is_empty() {
            warn!(%name, "environment variable is set to an empty value");
        }
        env.insert(name.clone(), value.clone());
    }

    if let Some(bin_dir) = bin_dir {
        let extended = match env.get("PATH") {
            Some(existing) => format!("{existing}:{bin_dir}"),
            None => format!("{}:{}", std::env::var("PATH").unwrap_or_default(), bin_dir),
        };
        env.insert("PATH".to_string(), extended);
    }

    Ok(env)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("environment variable name `{0}` is not a valid identifier (strict mode)")]
    InvalidName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_names_are_dropped_in_non_strict_mode() {
        let mut base = BTreeMap::new();
        base.insert("1BAD".to_string(), "x".to_string());
        base.insert("GOOD".to_string(), "y".to_string());
        let env = assemble_env(&base, None, false).unwrap();
        assert!(!env.contains_key("1BAD"));
        assert_eq!(env.get("GOOD"), Some(&"y".to_string()));
    }

    #[test]
    fn invalid_names_fail_in_strict_mode() {
        let mut base = BTreeMap::new();
        base.insert("1BAD".to_string(), "x".to_string());
        let err = assemble_env(&base, None, true).unwrap_err();
        assert_eq!(err, EnvError::InvalidName("1BAD".to_string()));
    }

    #[test]
    fn bin_dir_prepends_to_existing_path() {
        let mut base = BTreeMap::new();
        base.insert("PATH".to_string(), "/usr/bin".to_string());
        let bin_dir = Utf8Path::new("/project/bin");
        let env = assemble_env(&base, Some(bin_dir), false).unwrap();
        assert_eq!(env.get("PATH").unwrap(), "/usr/bin:/project/bin");
    }
}
