//! Translation of Blade-style directives into tera syntax.
//!
//! This is a source-to-source mapping only; evaluation is left to tera. A
//! directive that sits alone on its line is hoisted out of the output along
//! with its indentation and line break, so indentation-sensitive formats such
//! as YAML come out the way they read in the template.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{message} on line {line}")]
pub struct TranslateError {
    pub message: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub source: String,
    /// Include targets in the order they appear.
    pub includes: Vec<String>,
    /// Variables read by `@if`, `@elseif` and `@unless` conditions. tera
    /// treats these as false when undefined, so callers check them.
    pub conditions: Vec<String>,
    /// Names that may legitimately be undefined: loop bindings and names
    /// guarded by `@isset` or `@empty`.
    pub exempt: Vec<String>,
}

pub fn translate(input: &str) -> Result<Translation, TranslateError> {
    let mut translator = Translator {
        src: input,
        pos: 0,
        out: String::with_capacity(input.len()),
        includes: Vec::new(),
        conditions: Vec::new(),
        exempt: vec!["loop".to_string()],
    };
    translator.run()?;
    Ok(Translation {
        source: translator.out,
        includes: translator.includes,
        conditions: translator.conditions,
        exempt: translator.exempt,
    })
}

struct Translator<'a> {
    src: &'a str,
    pos: usize,
    out: String,
    includes: Vec<String>,
    conditions: Vec<String>,
    exempt: Vec<String>,
}

impl Translator<'_> {
    fn run(&mut self) -> Result<(), TranslateError> {
        let src = self.src;
        while self.pos < src.len() {
            let rest = &src[self.pos..];

            if rest.starts_with("{{--") {
                let end = self.find_close(self.pos + 4, "--}}", "comment")?;
                self.emit_statement(end, String::new());
            } else if rest.starts_with("@{{") {
                let end = self.find_close(self.pos + 3, "}}", "echo")?;
                let literal = &src[self.pos + 1..end];
                self.out.push_str("{% raw %}");
                self.out.push_str(literal);
                self.out.push_str("{% endraw %}");
                self.pos = end;
            } else if rest.starts_with("{!!") {
                let end = self.find_close(self.pos + 3, "!!}", "echo")?;
                let expr = &src[self.pos + 3..end - 3];
                self.push_echo(expr);
                self.pos = end;
            } else if rest.starts_with("{{") {
                let end = self.find_close(self.pos + 2, "}}", "echo")?;
                let expr = &src[self.pos + 2..end - 2];
                self.push_echo(expr);
                self.pos = end;
            } else if rest.starts_with("{%") || rest.starts_with("{#") {
                // Literal text that tera would otherwise read as a tag.
                self.out.push_str(&format!("{{{{ \"{}\" }}}}", &rest[..2]));
                self.pos += 2;
            } else if rest.starts_with("@@") && self.at_word_boundary() {
                let word = identifier(&rest[2..]);
                self.out.push('@');
                self.out.push_str(if word.is_empty() { "@" } else { word });
                self.pos += 2 + word.len();
            } else if rest.starts_with('@') && self.at_word_boundary() {
                if !self.directive()? {
                    self.out.push('@');
                    self.pos += 1;
                }
            } else {
                let ch = rest.chars().next().unwrap_or_default();
                self.out.push(ch);
                self.pos += ch.len_utf8();
            }
        }
        Ok(())
    }

    fn line(&self) -> usize {
        self.src[..self.pos].matches('\n').count() + 1
    }

    fn error(&self, message: impl Into<String>) -> TranslateError {
        TranslateError {
            message: message.into(),
            line: self.line(),
        }
    }

    /// `@` only starts a directive when not glued to a preceding word, which
    /// keeps e-mail addresses intact.
    fn at_word_boundary(&self) -> bool {
        self.src[..self.pos]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_' || c == '.'))
    }

    /// Byte offset just past `close`, searching from `from`.
    fn find_close(&self, from: usize, close: &str, what: &str) -> Result<usize, TranslateError> {
        self.src[from..]
            .find(close)
            .map(|idx| from + idx + close.len())
            .ok_or_else(|| self.error(format!("unterminated {what}")))
    }

    fn push_echo(&mut self, expr: &str) {
        self.out.push_str("{{ ");
        self.out.push_str(&translate_expr(expr));
        self.out.push_str(" }}");
    }

    /// Emit `tag` for the statement spanning `self.pos..end`, hoisting it when
    /// it is alone on its line.
    fn emit_statement(&mut self, end: usize, tag: String) {
        let line_start = self.src[..self.pos].rfind('\n').map_or(0, |i| i + 1);
        let indent = &self.src[line_start..self.pos];
        let after = &self.src[end..];
        let line_end = after.find('\n');
        let trailing = &after[..line_end.unwrap_or(after.len())];

        let alone = indent.chars().all(|c| c == ' ' || c == '\t')
            && trailing.chars().all(char::is_whitespace);

        if alone {
            self.out.truncate(self.out.len() - indent.len());
            self.out.push_str(&tag);
            self.pos = match line_end {
                Some(idx) => end + idx + 1,
                None => self.src.len(),
            };
        } else {
            self.out.push_str(&tag);
            self.pos = end;
        }
    }

    /// Translate the directive at `self.pos`. Returns false for words that are
    /// not directives so they stay literal.
    fn directive(&mut self) -> Result<bool, TranslateError> {
        let src = self.src;
        let name = identifier(&src[self.pos + 1..]);
        let mut end = self.pos + 1 + name.len();

        let gap = &src[end..];
        let spaces = gap.len() - gap.trim_start_matches(|c: char| c == ' ' || c == '\t').len();
        let open = end + spaces;
        let has_args = src[open..].starts_with('(');

        let needs_args = match name {
            "if" | "elseif" | "unless" | "isset" | "foreach" | "forelse" | "include" => true,
            "empty" => has_args,
            "else" | "endif" | "endunless" | "endisset" | "endforeach" | "endforelse"
            | "endempty" => false,
            "for" | "while" if has_args => {
                return Err(self.error(format!("@{name} is not supported, use @foreach")));
            }
            "endfor" | "endwhile" => {
                return Err(self.error(format!("@{name} is not supported, use @endforeach")));
            }
            _ => return Ok(false),
        };

        let mut args = "";
        if needs_args {
            if !has_args {
                return Err(self.error(format!("@{name} expects arguments")));
            }
            let close = matching_paren(src, open)
                .ok_or_else(|| self.error(format!("unbalanced parentheses in @{name}")))?;
            args = &src[open + 1..close];
            end = close + 1;
        }

        let tag = match name {
            "if" => {
                self.conditions.extend(referenced_names(args));
                format!("{{% if {} %}}", translate_expr(args))
            }
            "elseif" => {
                self.conditions.extend(referenced_names(args));
                format!("{{% elif {} %}}", translate_expr(args))
            }
            "unless" => {
                self.conditions.extend(referenced_names(args));
                format!("{{% if not ({}) %}}", translate_expr(args))
            }
            "isset" => {
                self.exempt.extend(referenced_names(args));
                let checks: Vec<String> = args
                    .split(',')
                    .map(|var| format!("{} is defined", translate_expr(var)))
                    .collect();
                format!("{{% if {} %}}", checks.join(" and "))
            }
            "empty" if needs_args => {
                self.exempt.extend(referenced_names(args));
                format!("{{% if not ({}) %}}", translate_expr(args))
            }
            // inside @forelse
            "empty" | "else" => "{% else %}".to_string(),
            "endif" | "endunless" | "endisset" | "endempty" => "{% endif %}".to_string(),
            "foreach" | "forelse" => self.foreach_tag(args)?,
            "include" => self.include_tag(args)?,
            "endforeach" | "endforelse" => "{% endfor %}".to_string(),
            _ => unreachable!("directive names matched above"),
        };

        self.emit_statement(end, tag);
        Ok(true)
    }

    fn foreach_tag(&mut self, args: &str) -> Result<String, TranslateError> {
        let (items, binding) = args
            .split_once(" as ")
            .ok_or_else(|| self.error("@foreach expects `$items as $item`"))?;
        self.exempt.extend(referenced_names(binding));

        let binding = match binding.split_once("=>") {
            Some((key, value)) => format!("{}, {}", translate_expr(key), translate_expr(value)),
            None => translate_expr(binding),
        };
        Ok(format!(
            "{{% for {binding} in {} %}}",
            translate_expr(items)
        ))
    }

    fn include_tag(&mut self, args: &str) -> Result<String, TranslateError> {
        let args = args.trim();
        let quote = args
            .chars()
            .next()
            .filter(|c| *c == '\'' || *c == '"')
            .ok_or_else(|| self.error("@include expects a quoted file name"))?;
        let body = &args[1..];
        let close = body
            .find(quote)
            .ok_or_else(|| self.error("unterminated string in @include"))?;
        let name = &body[..close];
        if !body[close + 1..].trim().is_empty() {
            return Err(self.error("passing data to @include is not supported"));
        }
        if name.is_empty() || name.contains('"') {
            return Err(self.error(format!("invalid @include target '{name}'")));
        }

        self.includes.push(name.to_string());
        Ok(format!("{{% include \"{name}\" %}}"))
    }
}

fn identifier(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(s.len(), |(i, _)| i);
    &s[..end]
}

/// Index of the `)` matching the `(` at `open`, skipping string literals.
fn matching_paren(src: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in src[open..].char_indices() {
        if let Some(q) = quote {
            match ch {
                '\\' if !escaped => escaped = true,
                c if c == q && !escaped => quote = None,
                _ => escaped = false,
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn push_word(out: &mut String, word: &str) {
    if !out.is_empty() && !out.ends_with(' ') {
        out.push(' ');
    }
    out.push_str(word);
    out.push(' ');
}

/// Map a PHP-flavoured expression onto tera's expression syntax.
/// `a ?? b` becomes `a | default(value=b)`.
pub fn translate_expr(expr: &str) -> String {
    let mut operands = split_coalesce(expr).into_iter();
    let mut out = operands.next().map(translate_operand).unwrap_or_default();
    for fallback in operands {
        out = format!("{out} | default(value={})", translate_operand(fallback));
    }
    out
}

/// Split on `??` outside of strings and brackets.
fn split_coalesce(expr: &str) -> Vec<&str> {
    let bytes = expr.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else {
            match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                b'?' if depth == 0 && bytes.get(i + 1) == Some(&b'?') => {
                    parts.push(&expr[start..i]);
                    i += 2;
                    start = i;
                    continue;
                }
                _ => {}
            }
        }
        i += 1;
    }
    parts.push(&expr[start..]);
    parts
}

/// Root variable names read by `expr`, skipping string literals and the
/// left-hand side of `??`.
pub fn referenced_names(expr: &str) -> Vec<String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut names: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            q @ ('\'' | '"') => {
                i += 1;
                while i < chars.len() && chars[i] != q {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                if end == start {
                    i += 1;
                    continue;
                }
                let name: String = chars[start..end].iter().collect();
                i = skip_accessors(&chars, end);

                let mut next = i;
                while next < chars.len() && chars[next].is_whitespace() {
                    next += 1;
                }
                let coalesced = chars.get(next) == Some(&'?') && chars.get(next + 1) == Some(&'?');
                if !coalesced && !names.contains(&name) {
                    names.push(name);
                }
            }
            _ => i += 1,
        }
    }
    names
}

/// Index just past any `->prop` or `[...]` chain starting at `i`.
fn skip_accessors(chars: &[char], mut i: usize) -> usize {
    loop {
        if chars.get(i) == Some(&'-') && chars.get(i + 1) == Some(&'>') {
            i += 2;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
        } else if chars.get(i) == Some(&'[') {
            let mut depth = 0;
            while i < chars.len() {
                match chars[i] {
                    '[' => depth += 1,
                    ']' => {
                        depth -= 1;
                        if depth == 0 {
                            i += 1;
                            break;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
        } else {
            return i;
        }
    }
}

fn translate_operand(expr: &str) -> String {
    let chars: Vec<char> = expr.trim().chars().collect();
    let mut out = String::with_capacity(expr.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        let starts = |s: &str| s.chars().enumerate().all(|(k, c)| chars.get(i + k) == Some(&c));

        match ch {
            '\'' | '"' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != ch {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                let end = (i + 1).min(chars.len());
                out.extend(&chars[start..end]);
                i = end;
                continue;
            }
            '$' if next.is_some_and(|c| c.is_alphabetic() || c == '_') => {}
            c if c.is_whitespace() => {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            _ if starts("->") => {
                out.push('.');
                i += 1;
            }
            _ if starts("===") || starts("!==") => {
                out.push_str(if ch == '=' { "==" } else { "!=" });
                i += 2;
            }
            _ if starts("==") || starts("!=") || starts("<=") || starts(">=") => {
                out.push(ch);
                out.push('=');
                i += 1;
            }
            _ if starts("&&") => {
                push_word(&mut out, "and");
                i += 1;
            }
            _ if starts("||") => {
                push_word(&mut out, "or");
                i += 1;
            }
            '!' => push_word(&mut out, "not"),
            '.' => {
                let prev = i.checked_sub(1).map(|p| chars[p]);
                let spaced = prev.is_some_and(char::is_whitespace)
                    || next.is_some_and(char::is_whitespace);
                if spaced {
                    push_word(&mut out, "~");
                } else {
                    out.push('.');
                }
            }
            _ => out.push(ch),
        }
        i += 1;
    }

    out.trim_end().to_string()
}
