use std::path::Path;

use crate::error::{Result, StencilError};

/// Parse dotenv-style `KEY=value` lines, preserving file order.
pub fn parse(path: &Path, contents: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

        let (key, value) = line.split_once('=').ok_or_else(|| StencilError::EnvParse {
            path: path.to_path_buf(),
            line: idx + 1,
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(StencilError::EnvParse {
                path: path.to_path_buf(),
                line: idx + 1,
            });
        }

        pairs.push((key.to_string(), parse_value(value.trim())));
    }

    Ok(pairs)
}

fn parse_value(value: &str) -> String {
    if let Some(inner) = quoted(value, '"') {
        return unescape(inner);
    }
    if let Some(inner) = quoted(value, '\'') {
        return inner.to_string();
    }
    // Unquoted values end at an inline comment.
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

/// Return the text between a leading quote and its closing quote, ignoring
/// anything after the closing quote.
fn quoted(value: &str, quote: char) -> Option<&str> {
    let rest = value.strip_prefix(quote)?;
    let mut escaped = false;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '\\' if quote == '"' && !escaped => escaped = true,
            c if c == quote && !escaped => return Some(&rest[..idx]),
            _ => escaped = false,
        }
    }
    None
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
