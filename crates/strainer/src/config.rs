//! Configuration: request parameter names, list delimiters and the
//! unknown-filter policy.

use std::env;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Resolver configuration.
///
/// Threaded explicitly into request parsing and resolution; there is no
/// global state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Names of the four parameter groups.
    pub parameters: ParameterNames,

    /// Delimiter used to split string-encoded lists, per group.
    pub delimiters: Delimiters,

    /// Silently drop unknown filters instead of failing (default: false).
    pub ignore_unknown_filters: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterNames {
    pub filter: String,
    pub sort: String,
    pub include: String,
    pub fields: String,
}

impl Default for ParameterNames {
    fn default() -> Self {
        Self {
            filter: "filter".to_string(),
            sort: "sort".to_string(),
            include: "include".to_string(),
            fields: "fields".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delimiters {
    pub filter: char,
    pub sort: char,
    pub include: char,
    pub fields: char,
}

impl Delimiters {
    /// The same delimiter for every group.
    pub fn uniform(delimiter: char) -> Self {
        Self {
            filter: delimiter,
            sort: delimiter,
            include: delimiter,
            fields: delimiter,
        }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::uniform(',')
    }
}

impl Config {
    /// Load configuration from `STRAINER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(name) = lookup("STRAINER_FILTER_PARAM") {
            config.parameters.filter = name;
        }
        if let Some(name) = lookup("STRAINER_SORT_PARAM") {
            config.parameters.sort = name;
        }
        if let Some(name) = lookup("STRAINER_INCLUDE_PARAM") {
            config.parameters.include = name;
        }
        if let Some(name) = lookup("STRAINER_FIELDS_PARAM") {
            config.parameters.fields = name;
        }

        if let Some(raw) = lookup("STRAINER_ARRAY_DELIMITER") {
            let delimiter = parse_delimiter(&raw).context("STRAINER_ARRAY_DELIMITER")?;
            config.delimiters = Delimiters::uniform(delimiter);
        }
        if let Some(raw) = lookup("STRAINER_FILTER_DELIMITER") {
            config.delimiters.filter =
                parse_delimiter(&raw).context("STRAINER_FILTER_DELIMITER")?;
        }
        if let Some(raw) = lookup("STRAINER_SORT_DELIMITER") {
            config.delimiters.sort = parse_delimiter(&raw).context("STRAINER_SORT_DELIMITER")?;
        }
        if let Some(raw) = lookup("STRAINER_INCLUDE_DELIMITER") {
            config.delimiters.include =
                parse_delimiter(&raw).context("STRAINER_INCLUDE_DELIMITER")?;
        }
        if let Some(raw) = lookup("STRAINER_FIELDS_DELIMITER") {
            config.delimiters.fields =
                parse_delimiter(&raw).context("STRAINER_FIELDS_DELIMITER")?;
        }

        if let Some(raw) = lookup("STRAINER_IGNORE_UNKNOWN_FILTERS") {
            config.ignore_unknown_filters = raw
                .trim()
                .parse()
                .context("STRAINER_IGNORE_UNKNOWN_FILTERS must be true or false")?;
        }

        Ok(config)
    }

    /// Set one delimiter for all parameter groups.
    pub fn with_array_delimiter(mut self, delimiter: char) -> Self {
        self.delimiters = Delimiters::uniform(delimiter);
        self
    }

    pub fn with_ignore_unknown_filters(mut self, ignore: bool) -> Self {
        self.ignore_unknown_filters = ignore;
        self
    }
}

fn parse_delimiter(raw: &str) -> Result<char> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => bail!("delimiter must be exactly one character, got {raw:?}"),
    }
}
