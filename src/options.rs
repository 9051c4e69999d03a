//! Parsing of `--name` / `--name=value` tokens that are not known to the CLI
//! definition. Those tokens become template variables.

use std::ffi::OsString;

use serde_json::Value;

use crate::error::{Result, StencilError};

/// Option names consumed by the tool itself. These never become variables.
pub const RESERVED: &[&str] = &[
    "help",
    "quiet",
    "verbose",
    "version",
    "ansi",
    "no-ansi",
    "no-interaction",
    "save-to",
    "save-as",
    "save-directory",
    "save-dir",
    "force",
    "dry-run",
    "from-json",
    "from-env",
    "from-yaml",
    "cache-path",
    "compiled-path",
    "keep-cache",
    "confirm",
    "trim",
];

/// Reserved options that take a value, possibly as the following token.
const RESERVED_WITH_VALUE: &[&str] = &[
    "save-to",
    "save-as",
    "save-directory",
    "save-dir",
    "from-json",
    "from-env",
    "from-yaml",
    "cache-path",
    "compiled-path",
    "confirm",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// How an option would be registered with an argument parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionMode {
    None,
    Required,
    RequiredMulti,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Flag,
    Single(String),
    Multi(Vec<String>),
}

impl OptionValue {
    pub fn mode(&self) -> OptionMode {
        match self {
            OptionValue::Flag => OptionMode::None,
            OptionValue::Single(_) => OptionMode::Required,
            OptionValue::Multi(_) => OptionMode::RequiredMulti,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            OptionValue::Flag => Value::Bool(true),
            OptionValue::Single(s) => Value::String(s.clone()),
            OptionValue::Multi(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// Parsed options in the order they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    entries: Vec<(String, OptionValue)>,
}

impl ParsedOptions {
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Registration view: option name to the mode it needs.
    pub fn modes(&self) -> Vec<(&str, OptionMode)> {
        self.iter().map(|(n, v)| (n, v.mode())).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }
}

/// Split a `--name[=value]` token. An empty value counts as a bare flag.
fn split_token(token: &str) -> Option<(&str, Option<&str>)> {
    let body = token.strip_prefix("--")?;
    let (name, value) = match body.split_once('=') {
        Some((name, value)) => (name, Some(value).filter(|v| !v.is_empty())),
        None => (body, None),
    };
    if name.is_empty() {
        return None;
    }
    Some((name, value))
}

/// Parse raw option tokens into values, promoting repeated valued options to
/// lists.
pub fn parse_options<I, S>(tokens: I) -> Result<ParsedOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed = ParsedOptions::default();

    for token in tokens {
        let token = token.as_ref();
        let (name, value) = split_token(token).ok_or_else(|| {
            StencilError::InvalidOption(format!(
                "Encountered invalid '{token}' as it is not --option or --option=value format."
            ))
        })?;

        match (parsed.position(name), value) {
            (None, Some(value)) => parsed
                .entries
                .push((name.to_string(), OptionValue::Single(value.to_string()))),
            (None, None) => parsed.entries.push((name.to_string(), OptionValue::Flag)),
            (Some(idx), Some(value)) => {
                let slot = &mut parsed.entries[idx].1;
                match slot {
                    OptionValue::Single(first) => {
                        *slot = OptionValue::Multi(vec![first.clone(), value.to_string()]);
                    }
                    OptionValue::Multi(values) => values.push(value.to_string()),
                    OptionValue::Flag => return Err(already_provided(name)),
                }
            }
            (Some(_), None) => return Err(already_provided(name)),
        }
    }

    Ok(parsed)
}

fn already_provided(name: &str) -> StencilError {
    StencilError::InvalidOption(format!("The '{name}' option has already been provided."))
}

/// Argv split into what the CLI definition understands and the pass-through
/// variable tokens.
#[derive(Debug, Default)]
pub struct SplitArgs {
    pub known: Vec<OsString>,
    pub dynamic: Vec<String>,
}

pub fn split_args<I>(args: I) -> SplitArgs
where
    I: IntoIterator<Item = OsString>,
{
    let mut split = SplitArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let Some(text) = arg.to_str() else {
            split.known.push(arg);
            continue;
        };

        if text == "--" {
            split.known.push(arg);
            split.known.extend(args.by_ref());
            break;
        }

        let Some(body) = text.strip_prefix("--") else {
            split.known.push(arg);
            continue;
        };

        let (name, has_inline_value) = match body.split_once('=') {
            Some((name, _)) => (name, true),
            None => (body, false),
        };

        if !is_reserved(name) {
            split.dynamic.push(text.to_string());
            continue;
        }

        let takes_value = RESERVED_WITH_VALUE.contains(&name);
        split.known.push(arg);
        if takes_value && !has_inline_value {
            if let Some(value) = args.next() {
                split.known.push(value);
            }
        }
    }

    split
}
