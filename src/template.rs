//! Message templating for operator notifications.
//!
//! Templates carry literal tokens such as `{database:name}` or `{time}`. Token
//! values are collected into a single lookup table and the template is rendered
//! in one left-to-right scan, so a substituted value is never scanned again.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::ResolvedBackupTarget;

pub const FAILURE_SUBJECT: &str = "URGENT: {database:name} backup failed";
pub const FAILURE_BODY: &str = "The backup for database {database:name} on {database:host} failed at {time} with the error {errorString}";
pub const SUCCESS_SUBJECT: &str = "{database:name} backed up";
pub const SUCCESS_BODY: &str =
    "The backup for database {database:name} on {database:host} completed at {time}";
pub const TEST_SUBJECT: &str = "Test message from smartbackup at {time}";
pub const TEST_BODY: &str =
    "This is a test message from smartbackup, if you can read it then notifications are working correctly";
/// Error string carried by the synthetic test message
pub const TEST_ERROR: &str = "some fake error";

/// Per-target tokens, in the order their values are supplied
pub const DATABASE_TOKENS: [&str; 4] = [
    "{database:name}",
    "{database:host}",
    "{database:port}",
    "{database:dbname}",
];

/// Tokens that do not depend on the target
pub const GENERAL_TOKENS: [&str; 2] = ["{time}", "{errorString}"];

/// Host name that is replaced with the machine's own name in messages
const LOOPBACK_HOST: &str = "localhost";

/// RFC 850 layout used for `{time}`; `%Z` prints `UTC` for a UTC timestamp
const TIME_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S %Z";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("not enough substitution values: {tokens} tokens but only {values} values")]
    SubstitutionCount { tokens: usize, values: usize },
}

/// Subject and body after substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// A set of token values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionPass {
    values: HashMap<String, String>,
}

impl SubstitutionPass {
    /// Pair the Nth token with the Nth value.
    ///
    /// # Errors
    ///
    /// `SubstitutionCount` if fewer values than tokens are supplied. Surplus
    /// values are ignored.
    pub fn positional<T, V>(tokens: &[T], values: &[V]) -> Result<Self, RenderError>
    where
        T: AsRef<str>,
        V: AsRef<str>,
    {
        if values.len() < tokens.len() {
            tracing::error!(
                "Not enough substitution values ({} for {} tokens), this is a bug",
                values.len(),
                tokens.len()
            );
            return Err(RenderError::SubstitutionCount {
                tokens: tokens.len(),
                values: values.len(),
            });
        }

        let values = tokens
            .iter()
            .zip(values)
            .map(|(t, v)| (t.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        Ok(Self { values })
    }

    /// Add the tokens of `later` that this pass does not define yet
    pub fn merge(mut self, later: SubstitutionPass) -> Self {
        for (token, value) in later.values {
            self.values.entry(token).or_insert(value);
        }
        self
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every known token in `template` with its value
    pub fn apply(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let candidate = &rest[open..];
            let replaced = candidate
                .find('}')
                .and_then(|close| self.get(&candidate[..=close]).map(|v| (v, close)));

            match replaced {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &candidate[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = &candidate[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Renders subject and body templates for a backup target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    pub fn new() -> Self {
        Self
    }

    /// Render both templates at the current time, in UTC
    pub fn render(
        &self,
        target: &ResolvedBackupTarget,
        subject_template: &str,
        body_template: &str,
        error: &str,
    ) -> Result<RenderedMessage, RenderError> {
        self.render_at(target, subject_template, body_template, error, Utc::now())
    }

    /// Render both templates as of `now`
    pub fn render_at(
        &self,
        target: &ResolvedBackupTarget,
        subject_template: &str,
        body_template: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<RenderedMessage, RenderError> {
        let database = &target.database;
        let database_values = [
            database.name.clone(),
            display_host(&database.host),
            database.port.to_string(),
            database.dbname.clone(),
        ];
        let general_values = [now.format(TIME_FORMAT).to_string(), error.to_string()];

        let pass = SubstitutionPass::positional(&DATABASE_TOKENS, &database_values)?
            .merge(SubstitutionPass::positional(&GENERAL_TOKENS, &general_values)?);

        Ok(RenderedMessage {
            subject: pass.apply(subject_template),
            body: pass.apply(body_template),
        })
    }
}

/// Host as shown to operators: `localhost` becomes the machine's hostname
pub fn display_host(host: &str) -> String {
    if host != LOOPBACK_HOST {
        return host.to_string();
    }

    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!("Could not determine hostname: {}. Sticking with localhost", e);
            host.to_string()
        }
    }
}
