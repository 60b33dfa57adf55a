//! Environment variable interpolation for config files.
//!
//! Recognised forms:
//! - `$VAR` / `${VAR}`: required, an error is recorded when unset
//! - `${VAR:-fallback}`: fallback when VAR is unset or empty
//! - `${VAR-fallback}`: fallback only when VAR is unset
//! - `$$`: a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?: (?P<op>:?-) (?P<fallback>[^}]*) )?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("placeholder pattern is valid")
});

/// Output of [`interpolate`].
#[derive(Debug)]
pub struct Interpolated {
    pub text: String,
    /// Every problem found, so all missing variables are reported at once.
    pub errors: Vec<String>,
}

impl Interpolated {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Substitute environment variables into `input`.
pub fn interpolate(input: &str) -> Interpolated {
    let mut errors = Vec::new();

    let text = PLACEHOLDER
        .replace_all(input, |caps: &Captures| {
            let whole = &caps[0];
            if whole == "$$" {
                return "$".to_string();
            }

            let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
                return whole.to_string();
            };
            let op = caps.name("op").map(|m| m.as_str());
            let fallback = caps.name("fallback").map(|m| m.as_str());

            match resolve(name.as_str(), op, fallback) {
                Ok(value) => value,
                Err(message) => {
                    errors.push(message);
                    whole.to_string()
                }
            }
        })
        .into_owned();

    Interpolated { text, errors }
}

fn resolve(name: &str, op: Option<&str>, fallback: Option<&str>) -> Result<String, String> {
    match env::var(name) {
        Ok(value) if value.contains(['\n', '\r']) => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        Ok(value) if value.is_empty() && op == Some(":-") => {
            Ok(fallback.unwrap_or_default().to_string())
        }
        Ok(value) => Ok(value),
        Err(_) => fallback
            .map(str::to_string)
            .ok_or_else(|| format!("environment variable '{name}' is not set")),
    }
}
