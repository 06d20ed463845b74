//! Argument parsing for prefix commands.
//!
//! Turns `.fm wk --period=7day "Guns N' Roses"` style input into a flag map
//! and an ordered list of positional words. Parsing never fails: anything that
//! doesn't look like a flag ends up as a positional argument.

use std::collections::HashMap;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedArgs {
    /// Flag name to value. A repeated flag keeps its last value.
    pub map: HashMap<String, String>,
    /// Positional words in the order they were given.
    pub unnamed: Vec<String>,
}

impl ParsedArgs {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    fn insert(&mut self, key: &str, value: &str) {
        self.map.insert(key.to_string(), value.to_string());
    }
}

/// Splits raw input on whitespace, keeping `"..."` and `'...'` segments
/// together with their quotes stripped.
///
/// A quote only opens a segment at the start of a word or right after a
/// `=`/`:` separator, and only when a closing quote follows. Apostrophes
/// inside words (`Don't`, `N'`) stay literal. An empty quoted segment (`""`)
/// is an empty word rather than nothing.
pub fn tokenize(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            if !current.is_empty() || quoted {
                tokens.push(std::mem::take(&mut current));
            }
            quoted = false;
            i += 1;
            continue;
        }

        if (c == '"' || c == '\'') && opens_quote(&current) {
            if let Some(len) = chars[i + 1..].iter().position(|&x| x == c) {
                current.extend(&chars[i + 1..i + 1 + len]);
                quoted = true;
                i += len + 2;
                continue;
            }
        }

        current.push(c);
        i += 1;
    }

    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    tokens
}

fn opens_quote(current: &str) -> bool {
    current.is_empty() || current.ends_with('=') || current.ends_with(':')
}

pub fn parse_args(input: &str) -> ParsedArgs {
    parse_tokens(&tokenize(input))
}

/// Classifies already tokenized words into flags and positional arguments.
pub fn parse_tokens<S: AsRef<str>>(tokens: &[S]) -> ParsedArgs {
    let mut parsed = ParsedArgs::default();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_ref();

        if let Some(body) = token.strip_prefix("--").filter(|b| !b.is_empty()) {
            match split_flag_body(body) {
                Some((key, value)) => parsed.insert(key, value),
                None => match tokens.get(i + 1).map(AsRef::as_ref) {
                    Some(next) if !next.starts_with('-') => {
                        parsed.insert(body, next);
                        i += 1;
                    }
                    _ => parsed.insert(body, "true"),
                },
            }
        } else if token.len() > 1 && token.starts_with('-') && !token.starts_with("--") {
            for flag in token.chars().skip(1) {
                parsed.insert(&flag.to_string(), "true");
            }
        } else if let Some((key, value)) = token.split_once('=') {
            parsed.insert(key, value);
        } else if let Some((key, value)) = token.split_once(':') {
            parsed.insert(key, value);
        } else {
            parsed.unnamed.push(token.to_string());
        }

        i += 1;
    }

    parsed
}

/// `key=value` or `key:value`, whichever separator comes first.
fn split_flag_body(body: &str) -> Option<(&str, &str)> {
    match (body.find('='), body.find(':')) {
        (Some(eq), Some(colon)) if eq < colon => Some((&body[..eq], &body[eq + 1..])),
        (Some(eq), None) => Some((&body[..eq], &body[eq + 1..])),
        (_, Some(colon)) => Some((&body[..colon], &body[colon + 1..])),
        (None, None) => None,
    }
}
