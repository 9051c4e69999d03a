use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    dotenv,
    error::{JsonErrorReason, Result, StencilError},
    options::{ParsedOptions, is_reserved},
};

/// Variables handed to the template, keyed by their camelCase name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, Value>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the normalized form of `key`, replacing any earlier value.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(normalize_key(key), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: AsRef<str>> FromIterator<(K, Value)> for Variables {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut vars = Variables::new();
        for (k, v) in iter {
            vars.insert(k.as_ref(), v);
        }
        vars
    }
}

/// Files to load variables from, each list in the order given on the CLI.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub yaml: Vec<PathBuf>,
    pub json: Vec<PathBuf>,
    pub env: Vec<PathBuf>,
}

/// Merge every source. Later sources win: yaml, json, env files, then CLI.
pub fn gather(sources: &Sources, cli: &ParsedOptions) -> Result<Variables> {
    let mut vars = Variables::new();

    for path in &sources.yaml {
        for (k, v) in load_yaml_file(path)? {
            vars.insert(&k, v);
        }
    }
    for path in &sources.json {
        for (k, v) in load_json_file(path)? {
            vars.insert(&k, v);
        }
    }
    for path in &sources.env {
        for (k, v) in load_env_file(path)? {
            vars.insert(&k, Value::String(v));
        }
    }

    for (name, value) in cli.iter() {
        if is_reserved(name) {
            continue;
        }
        vars.insert(name, value.to_value());
    }

    let keys: Vec<&str> = vars.keys().collect();
    debug!("gathered {} variables: {}", keys.len(), keys.join(", "));
    Ok(vars)
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(StencilError::FileNotFound(path.to_path_buf()));
    }
    debug!("loading variables from {}", path.display());
    fs::read(path).map_err(|e| StencilError::io(format!("reading {}", path.display()), e))
}

pub fn load_json_file(path: &Path) -> Result<Map<String, Value>> {
    let raw = read_source(path)?;
    let value: Value = serde_json::from_slice(&raw).map_err(|e| StencilError::JsonParse {
        path: path.to_path_buf(),
        reason: classify_json_error(&e),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StencilError::JsonParse {
            path: path.to_path_buf(),
            reason: JsonErrorReason::NotAnObject,
        }),
    }
}

fn classify_json_error(err: &serde_json::Error) -> JsonErrorReason {
    use serde_json::error::Category;

    let msg = err.to_string();
    if msg.contains("recursion limit") {
        JsonErrorReason::Depth
    } else if msg.contains("control character") {
        JsonErrorReason::ControlCharacter
    } else if msg.contains("unicode") || msg.contains("UTF-8") {
        JsonErrorReason::Encoding
    } else {
        match err.classify() {
            Category::Syntax | Category::Eof => JsonErrorReason::Syntax,
            Category::Io | Category::Data => JsonErrorReason::Unknown,
        }
    }
}

pub fn load_yaml_file(path: &Path) -> Result<Map<String, Value>> {
    let raw = read_source(path)?;
    let yaml_err = |message: String| StencilError::YamlParse {
        path: path.to_path_buf(),
        message,
    };

    let text = String::from_utf8(raw).map_err(|e| yaml_err(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Map::new());
    }

    let value: Value = serde_yaml::from_str(&text).map_err(|e| yaml_err(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(yaml_err("top level value must be a mapping".into())),
    }
}

pub fn load_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    let raw = read_source(path)?;
    let text = String::from_utf8_lossy(&raw);
    dotenv::parse(path, &text)
}

fn is_word_separator(c: char) -> bool {
    matches!(c, '-' | '_' | '.') || c.is_whitespace()
}

/// Normalize a variable name to camelCase.
///
/// `favorite-food`, `favorite_food` and `FAVORITE_FOOD` all become
/// `favoriteFood`. Names without separators keep their inner casing, except
/// that fully upper-case names are lowered and the first letter is always
/// lower-case.
pub fn normalize_key(key: &str) -> String {
    if !key.chars().any(is_word_separator) {
        if !key.chars().any(char::is_lowercase) {
            return key.to_lowercase();
        }
        let mut chars = key.chars();
        return match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        };
    }

    let mut out = String::with_capacity(key.len());
    for word in key.split(is_word_separator).filter(|w| !w.is_empty()) {
        let word = word.to_lowercase();
        if out.is_empty() {
            out.push_str(&word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// The CLI flag that would supply a camelCase variable (`favoriteFood` ->
/// `favorite-food`).
pub fn flag_name(variable: &str) -> String {
    let mut out = String::with_capacity(variable.len() + 4);
    for (idx, ch) in variable.chars().enumerate() {
        if ch.is_uppercase() && idx > 0 {
            out.push('-');
        }
        out.extend(ch.to_lowercase());
    }
    out
}
