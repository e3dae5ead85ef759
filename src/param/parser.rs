//! Raw parameter parsing against declared specs.
//!
//! Parsing is pure: it builds a fresh [`ParsedParams`] map and either
//! returns it whole or fails with a `Validation` error, so a caller's
//! previously parsed state is never half-mutated.

use regex::Regex;

use super::{Cast, ParamSpec, ParamValue, ParsedParams};
use crate::core::{PipelineError, Result};

/// Values accepted as `true` for boolean casts.
const TRUTHY: [&str; 4] = ["true", "t", "yes", "y"];

/// Parse raw key/value pairs (insertion order preserved) against the
/// aggregate spec list.
///
/// 1. Every spec's default is seeded first, recursing into nested
///    arguments.
/// 2. Raw keys resolve by exact name, then alias; first match wins.
///    Undeclared keys contribute nothing.
/// 3. Compound values merge into the existing nested map rather than
///    replacing it, so progressive aliases accumulate.
pub fn parse(raw: &[(String, String)], specs: &[ParamSpec]) -> Result<ParsedParams> {
    let mut params = ParsedParams::new();
    for spec in specs {
        params.insert(spec.name.clone(), seed_default(spec)?);
    }

    for (key, value) in raw {
        let Some(spec) = specs.iter().find(|s| s.matches(key)) else {
            continue;
        };
        let parsed = parse_value(spec, value)?;
        match (params.get_mut(&spec.name), parsed) {
            (Some(ParamValue::Map(existing)), ParamValue::Map(update)) => {
                existing.extend(update);
            }
            (_, parsed) => {
                params.insert(spec.name.clone(), parsed);
            }
        }
    }

    Ok(params)
}

fn seed_default(spec: &ParamSpec) -> Result<ParamValue> {
    if !spec.arguments.is_empty() {
        let mut map = std::collections::BTreeMap::new();
        for arg in &spec.arguments {
            if let Some(default) = &arg.default {
                map.insert(arg.name.clone(), cast_value(arg.cast, default));
            }
        }
        return Ok(ParamValue::Map(map));
    }
    Ok(match &spec.default {
        Some(default) => cast_value(spec.cast, default),
        None => ParamValue::Null,
    })
}

fn parse_value(spec: &ParamSpec, value: &str) -> Result<ParamValue> {
    if spec.arguments.is_empty() {
        return parse_leaf(spec, value);
    }

    // Compound: pull each sub-argument out of the bracket mini-syntax,
    // e.g. `w[200]h[100]` against specs named width (alias w), height (h).
    let mut map = std::collections::BTreeMap::new();
    for arg in &spec.arguments {
        let mut alternatives = vec![regex::escape(&arg.name)];
        alternatives.extend(arg.aliases.iter().map(|a| regex::escape(a)));
        let pattern = format!(r"\b(?:{})\[(.*?)\]", alternatives.join("|"));
        let re = compile(&arg.name, &pattern)?;
        if let Some(captured) = re.captures(value).and_then(|c| c.get(1)) {
            map.insert(arg.name.clone(), parse_leaf(arg, captured.as_str())?);
        }
    }
    Ok(ParamValue::Map(map))
}

fn parse_leaf(spec: &ParamSpec, value: &str) -> Result<ParamValue> {
    if let Some(pattern) = &spec.regex {
        // Anchored, case-sensitive
        let re = compile(&spec.name, &format!("^(?:{pattern})$"))?;
        if !re.is_match(value) {
            return Err(PipelineError::validation(&spec.name, value));
        }
    }
    match spec.cast {
        Cast::Int => value
            .parse::<i64>()
            .map(ParamValue::Int)
            .map_err(|_| PipelineError::validation(&spec.name, value)),
        Cast::Bool => Ok(ParamValue::Bool(TRUTHY.contains(&value))),
        Cast::Str => Ok(ParamValue::Str(value.to_string())),
    }
}

fn compile(param: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|_| PipelineError::validation(param, pattern))
}

fn cast_value(cast: Cast, value: &str) -> ParamValue {
    match cast {
        Cast::Int => ParamValue::Int(value.parse().unwrap_or(0)),
        Cast::Bool => ParamValue::Bool(TRUTHY.contains(&value)),
        Cast::Str => ParamValue::Str(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn minify_spec() -> ParamSpec {
        ParamSpec::new("minify")
            .alias("m")
            .regex("true|false|t|f|yes|no|y|n")
            .default_value("false")
            .cast(Cast::Bool)
    }

    fn resize_spec() -> ParamSpec {
        ParamSpec::new("resize")
            .alias("r")
            .argument(ParamSpec::new("width").alias("w").regex(r"\d+").cast(Cast::Int))
            .argument(ParamSpec::new("height").alias("h").regex(r"\d+").cast(Cast::Int))
            .argument(
                ParamSpec::new("quality")
                    .aliases(&["q", "qlty"])
                    .regex(r"\d{1,2}|100")
                    .default_value("75")
                    .cast(Cast::Int),
            )
            .argument(
                ParamSpec::new("fillColour")
                    .aliases(&["fc", "fillColor"])
                    .regex("[A-Fa-f0-9]{3}|[A-Fa-f0-9]{6}")
                    .default_value("ffffff"),
            )
    }

    #[test]
    fn test_defaults_seeded() {
        let params = parse(&[], &[minify_spec()]).unwrap();
        assert_eq!(params["minify"], ParamValue::Bool(false));
    }

    #[test]
    fn test_leaf_cast_and_alias() {
        let params = parse(&raw(&[("m", "yes")]), &[minify_spec()]).unwrap();
        assert_eq!(params["minify"], ParamValue::Bool(true));
    }

    #[test]
    fn test_undeclared_key_ignored() {
        let params = parse(&raw(&[("nope", "1")]), &[minify_spec()]).unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params["minify"], ParamValue::Bool(false));
    }

    #[test]
    fn test_leaf_regex_mismatch() {
        let err = parse(&raw(&[("minify", "maybe")]), &[minify_spec()]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation { ref param, ref value }
                if param == "minify" && value == "maybe"
        ));
    }

    #[test]
    fn test_compound_bracket_syntax() {
        let params = parse(&raw(&[("resize", "w[200]h[100]")]), &[resize_spec()]).unwrap();
        let resize = &params["resize"];
        assert_eq!(resize.get_dimension("width"), Some(200));
        assert_eq!(resize.get_dimension("height"), Some(100));
        // Defaults survive alongside supplied sub-arguments
        assert_eq!(resize.get("quality").and_then(ParamValue::as_int), Some(75));
    }

    #[test]
    fn test_compound_merges_progressive_aliases() {
        let params = parse(
            &raw(&[("resize", "w[200]"), ("r", "h[100]")]),
            &[resize_spec()],
        )
        .unwrap();
        let resize = &params["resize"];
        assert_eq!(resize.get_dimension("width"), Some(200));
        assert_eq!(resize.get_dimension("height"), Some(100));
    }

    #[test]
    fn test_compound_sub_argument_validation() {
        let err = parse(&raw(&[("resize", "w[abc]")]), &[resize_spec()]).unwrap_err();
        // Bracket capture is non-greedy so `w[abc]` captures `abc`,
        // which fails the width pattern.
        assert!(matches!(
            err,
            PipelineError::Validation { ref param, .. } if param == "width"
        ));
    }

    #[test]
    fn test_compound_fill_colour_string() {
        let params = parse(&raw(&[("resize", "fc[336699]")]), &[resize_spec()]).unwrap();
        assert_eq!(
            params["resize"].get("fillColour").and_then(ParamValue::as_str),
            Some("336699")
        );
    }
}
