//! Declarative parameter schemas and typed values.
//!
//! Each filter declares the parameters it understands as a [`ParamSpec`]:
//! a name, optional aliases, an optional validation pattern, an optional
//! default, a cast, and - for compound parameters like
//! `resize[w[200]h[100]]` - nested argument specs. A spec either has
//! nested arguments or is a leaf scalar, never both.

mod parser;

pub use parser::parse;

use std::collections::BTreeMap;

use serde::Serialize;

/// How a raw string value is cast after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cast {
    #[default]
    Str,
    Int,
    Bool,
}

/// Declarative schema for one parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub aliases: Vec<String>,
    pub regex: Option<String>,
    pub default: Option<String>,
    pub cast: Cast,
    /// Nested argument specs for compound (bracket-syntax) parameters.
    pub arguments: Vec<ParamSpec>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            regex: None,
            default: None,
            cast: Cast::Str,
            arguments: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases.extend(aliases.iter().map(|a| (*a).to_string()));
        self
    }

    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn cast(mut self, cast: Cast) -> Self {
        self.cast = cast;
        self
    }

    pub fn argument(mut self, spec: ParamSpec) -> Self {
        self.arguments.push(spec);
        self
    }

    /// Does `key` address this spec, by name or alias?
    pub fn matches(&self, key: &str) -> bool {
        self.name == key || self.aliases.iter().any(|a| a == key)
    }
}

/// A parsed, cast parameter value.
///
/// `Map` holds the sub-arguments of a compound parameter. `Null` is the
/// seeded value for a declared leaf parameter with no default. Values
/// serialize deterministically (`BTreeMap`) so they can feed the cache
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Str(String),
    Int(i64),
    Bool(bool),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// `true` only for `Bool(true)`; filters use this for their
    /// controlling argument.
    pub fn is_truthy(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Look up a sub-argument of a compound value.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Sub-argument as a positive integer, `None` when absent or zero.
    pub fn get_dimension(&self, key: &str) -> Option<u32> {
        match self.get(key)?.as_int()? {
            n if n > 0 => u32::try_from(n).ok(),
            _ => None,
        }
    }
}

/// Parameter name -> parsed value, defaults pre-seeded for every declared
/// parameter.
pub type ParsedParams = BTreeMap<String, ParamValue>;
