// Follower page decoding

use crate::error::ParseError;
use crate::model::{FollowerPage, UserRecord};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Free-text fields the API is known to leak raw quotes into.
pub const SANITIZED_FIELDS: &[&str] = &["headline", "url_token"];

static SANITIZED_FIELD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| field_pattern(SANITIZED_FIELDS));

#[derive(Deserialize)]
struct RawPage {
    paging: RawPaging,
    data: Vec<UserRecord>,
}

#[derive(Deserialize)]
struct RawPaging {
    totals: u64,
    #[serde(default)]
    is_end: Option<bool>,
}

/// Decode one followers page, stripping stray quotes from `headline` and `url_token` first.
pub fn parse_follower_page(raw_body: &str) -> Result<FollowerPage, ParseError> {
    if raw_body.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let sanitized = sanitize_with(raw_body, &SANITIZED_FIELD_PATTERN);
    let raw: RawPage = serde_json::from_str(&sanitized)?;

    Ok(FollowerPage {
        records: raw.data,
        total_count: raw.paging.totals,
        is_end: raw.paging.is_end,
    })
}

/// Remove unescaped `"` characters from inside the string values of `fields`.
///
/// Only the values of the named keys are touched. A value ends at the first
/// unescaped quote that is followed by `}`, `]`, end of input, or a comma that
/// opens the next `"key":` pair.
pub fn sanitize_string_fields(body: &str, fields: &[&str]) -> String {
    if fields.is_empty() {
        return body.to_string();
    }
    sanitize_with(body, &field_pattern(fields))
}

fn field_pattern(fields: &[&str]) -> Regex {
    let alternatives = fields
        .iter()
        .map(|f| regex::escape(f))
        .collect::<Vec<_>>()
        .join("|");
    // The alternatives are escaped, so the pattern is always valid.
    Regex::new(&format!(r#""(?:{})"\s*:\s*""#, alternatives)).unwrap()
}

fn sanitize_with(body: &str, pattern: &Regex) -> String {
    let mut out = String::with_capacity(body.len());
    let mut pos = 0;

    while let Some(m) = pattern.find_at(body, pos) {
        out.push_str(&body[pos..m.end()]);
        let value_start = m.end();

        let Some(value_end) = find_value_end(body.as_bytes(), value_start) else {
            // Unterminated value; leave it for the JSON decoder to reject.
            pos = value_start;
            break;
        };

        push_without_stray_quotes(&mut out, &body[value_start..value_end]);
        out.push('"');
        pos = value_end + 1;
    }

    out.push_str(&body[pos..]);
    out
}

fn push_without_stray_quotes(out: &mut String, value: &str) {
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            out.push(c);
            escaped = true;
        } else if c != '"' {
            out.push(c);
        }
    }
}

fn find_value_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' if closes_value(bytes, i + 1) => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn closes_value(bytes: &[u8], from: usize) -> bool {
    let mut i = skip_whitespace(bytes, from);
    match bytes.get(i) {
        None | Some(b'}') | Some(b']') => true,
        Some(b',') => {
            i = skip_whitespace(bytes, i + 1);
            if bytes.get(i) != Some(&b'"') {
                return false;
            }
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i = skip_whitespace(bytes, i + 1);
            bytes.get(i) == Some(&b':')
        }
        _ => false,
    }
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_leaves_clean_values_alone() {
        let body = r#"{"headline":"plain text","name":"x"}"#;
        assert_eq!(sanitize_string_fields(body, &["headline"]), body);
    }

    #[test]
    fn test_sanitize_strips_embedded_quotes() {
        let body = r#"{"headline":"he said "hi" twice","name":"x"}"#;
        assert_eq!(
            sanitize_string_fields(body, &["headline"]),
            r#"{"headline":"he said hi twice","name":"x"}"#
        );
    }

    #[test]
    fn test_sanitize_keeps_escaped_quotes() {
        let body = r#"{"headline":"a \"quoted\" word"}"#;
        assert_eq!(sanitize_string_fields(body, &["headline"]), body);
    }

    #[test]
    fn test_sanitize_quote_followed_by_comma_inside_value() {
        let body = r#"{"headline":"say "yes", then go","name":"x"}"#;
        assert_eq!(
            sanitize_string_fields(body, &["headline"]),
            r#"{"headline":"say yes, then go","name":"x"}"#
        );
    }

    #[test]
    fn test_sanitize_only_touches_named_fields() {
        let body = r#"{"name":"a "b" c","headline":"d "e""}"#;
        assert_eq!(
            sanitize_string_fields(body, &["headline"]),
            r#"{"name":"a "b" c","headline":"d e"}"#
        );
    }

    #[test]
    fn test_sanitize_skips_null_values() {
        let body = r#"{"headline":null,"url_token":"a"b"}"#;
        assert_eq!(
            sanitize_string_fields(body, SANITIZED_FIELDS),
            r#"{"headline":null,"url_token":"ab"}"#
        );
    }

    #[test]
    fn test_sanitize_handles_whitespace_and_unicode() {
        let body = "{ \"headline\" : \"程序员 \"全栈\" \" , \"name\": \"x\" }";
        assert_eq!(
            sanitize_string_fields(body, &["headline"]),
            "{ \"headline\" : \"程序员 全栈 \" , \"name\": \"x\" }"
        );
    }

    #[test]
    fn test_sanitize_without_fields_is_identity() {
        let body = r#"{"headline":"a"b"}"#;
        assert_eq!(sanitize_string_fields(body, &[]), body);
    }
}
