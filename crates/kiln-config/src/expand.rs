//! Environment variable expansion for configuration strings.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::ConfigError;

/// Matches `${VAR}` and `${VAR:-default}`.
static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
});

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// `field` names the configuration key in error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    expand_with(value, field, |name| std::env::var(name).ok())
}

fn expand_with(
    value: &str,
    field: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut missing = None;
    let expanded = ENV_REF.replace_all(value, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(val), _) => val,
            (None, Some(default)) => default.as_str().to_owned(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_owned());
                String::new()
            }
        }
    });

    if let Some(name) = missing {
        return Err(ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{name}}} not set"),
        });
    }
    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        (name == "KILN_HOST").then(|| "0.0.0.0".to_owned())
    }

    #[test]
    fn test_plain_value_unchanged() {
        assert_eq!(expand_with("localhost", "f", lookup).unwrap(), "localhost");
    }

    #[test]
    fn test_set_variable() {
        assert_eq!(expand_with("${KILN_HOST}", "f", lookup).unwrap(), "0.0.0.0");
    }

    #[test]
    fn test_default_used_when_unset() {
        let out = expand_with("https://${DOMAIN:-example.com}/", "f", lookup).unwrap();
        assert_eq!(out, "https://example.com/");
    }

    #[test]
    fn test_missing_variable_errors() {
        let err = expand_with("${NOPE}", "server.host", lookup).unwrap_err();
        assert!(err.to_string().contains("server.host"));
        assert!(err.to_string().contains("${NOPE} not set"));
    }
}
