//! # Statement Templates
//!
//! Operators supply statement templates such as
//! `CREATE USER "{{username}}" WITH PASSWORD '{{password}}'`. This module
//! substitutes the generated username and the host-supplied password into those
//! templates. Substitution is literal: nothing is quoted or escaped here, so the
//! template itself is responsible for backend-safe quoting.
//!
//! Exactly two placeholders are recognised, [`USERNAME_PLACEHOLDER`] and
//! [`PASSWORD_PLACEHOLDER`]. Everything else in a template, including other
//! `{{...}}` spans, is copied through untouched.

use crate::secrets::SecretString;
use serde::{Deserialize, Serialize};

/// Placeholder replaced with the account name
pub const USERNAME_PLACEHOLDER: &str = "{{username}}";

/// Placeholder replaced with the account password
pub const PASSWORD_PLACEHOLDER: &str = "{{password}}";

/// Separator between statements inside one template
pub const STATEMENT_SEPARATOR: char = ';';

/// Ordered statement templates supplied with a single operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statements {
    pub commands: Vec<String>,
}

impl Statements {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { commands: commands.into_iter().map(Into::into).collect() }
    }

    /// True when the templates split into no statements at all.
    pub fn is_empty(&self) -> bool {
        self.commands.iter().all(|c| split_statements(c).next().is_none())
    }
}

/// Values substituted into a template. Unset bindings leave their placeholder as-is.
#[derive(Clone, Copy, Default)]
pub struct StatementBindings<'a> {
    username: Option<&'a str>,
    password: Option<&'a str>,
}

impl<'a> StatementBindings<'a> {
    pub fn new(username: &'a str) -> Self {
        Self { username: Some(username), password: None }
    }

    pub fn with_password(mut self, password: &'a SecretString) -> Self {
        self.password = Some(password.expose_secret());
        self
    }
}

/// Render each template, dropping empty and whitespace-only ones.
pub fn render(templates: &[String], bindings: &StatementBindings<'_>) -> Vec<String> {
    templates
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| render_one(t, bindings))
        .collect()
}

/// Split every template on `;`, then render each fragment.
///
/// Splitting happens before substitution so a `;` inside a bound password never
/// produces an extra statement. Blank fragments are dropped.
pub fn render_batch(templates: &[String], bindings: &StatementBindings<'_>) -> Vec<String> {
    templates
        .iter()
        .flat_map(|t| split_statements(t))
        .map(|fragment| render_one(fragment, bindings))
        .collect()
}

/// The non-blank `;`-separated fragments of a template, trimmed.
pub fn split_statements(template: &str) -> impl Iterator<Item = &str> {
    template.split(STATEMENT_SEPARATOR).map(str::trim).filter(|s| !s.is_empty())
}

/// Substitute bindings into a single template in one left-to-right pass.
pub fn render_one(template: &str, bindings: &StatementBindings<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];

        let matched = [
            (USERNAME_PLACEHOLDER, bindings.username),
            (PASSWORD_PLACEHOLDER, bindings.password),
        ]
        .into_iter()
        .find_map(|(placeholder, value)| match value {
            Some(value) if candidate.starts_with(placeholder) => Some((placeholder.len(), value)),
            _ => None,
        });

        match matched {
            Some((len, value)) => {
                out.push_str(value);
                rest = &candidate[len..];
            }
            None => {
                out.push_str("{{");
                rest = &candidate[2..];
            }
        }
    }

    out.push_str(rest);
    out
}
