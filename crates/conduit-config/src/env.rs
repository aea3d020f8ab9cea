use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `{{ env.NAME }}` or `{{ env.NAME | default("value") }}`
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
});

/// Expand environment placeholders in raw TOML text
///
/// Runs before deserialization so config structs can hold plain `String` and
/// `SecretString` values. TOML comment lines are copied through untouched so
/// a commented-out key never demands a variable.
pub fn expand_env(input: &str) -> anyhow::Result<String> {
    let mut output = input
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                Ok(line.to_owned())
            } else {
                expand_line(line)
            }
        })
        .collect::<anyhow::Result<Vec<_>>>()?
        .join("\n");

    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str) -> anyhow::Result<String> {
    let mut failure = None;

    let expanded = PLACEHOLDER.replace_all(line, |captures: &Captures<'_>| {
        match resolve(&captures[1], captures.get(2).map(|m| m.as_str())) {
            Ok(value) => value,
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

fn resolve(key: &str, default: Option<&str>) -> anyhow::Result<String> {
    let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        anyhow::bail!("only variables scoped with 'env.' are supported: `{key}`");
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => anyhow::bail!("environment variable not found: `{name}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "listen_address = \"127.0.0.1:8080\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn api_key_is_substituted() {
        temp_env::with_var("CONDUIT_TEST_KEY", Some("sk-or-123"), || {
            let result = expand_env("api_key = \"{{ env.CONDUIT_TEST_KEY }}\"").unwrap();
            assert_eq!(result, "api_key = \"sk-or-123\"");
        });
    }

    #[test]
    fn several_placeholders_on_separate_lines() {
        let vars = [("CONDUIT_A", Some("a")), ("CONDUIT_B", Some("b"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("x = \"{{ env.CONDUIT_A }}\"\ny = \"{{env.CONDUIT_B}}\"").unwrap();
            assert_eq!(result, "x = \"a\"\ny = \"b\"");
        });
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var_unset("CONDUIT_MISSING", || {
            let err = expand_env("api_key = \"{{ env.CONDUIT_MISSING }}\"").unwrap_err();
            assert!(err.to_string().contains("CONDUIT_MISSING"));
        });
    }

    #[test]
    fn non_env_scope_is_rejected() {
        let err = expand_env("api_key = \"{{ secrets.KEY }}\"").unwrap_err();
        assert!(err.to_string().contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comment_lines_are_not_expanded() {
        temp_env::with_var_unset("CONDUIT_MISSING", || {
            let input = "  # api_key = \"{{ env.CONDUIT_MISSING }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("CONDUIT_OPTIONAL", || {
            let result = expand_env("api_key = \"{{ env.CONDUIT_OPTIONAL | default(\"\") }}\"").unwrap();
            assert_eq!(result, "api_key = \"\"");
        });

        temp_env::with_var("CONDUIT_OPTIONAL", Some("set"), || {
            let result = expand_env("api_key = \"{{ env.CONDUIT_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "api_key = \"set\"");
        });
    }
}
