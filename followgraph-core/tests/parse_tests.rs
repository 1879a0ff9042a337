// Tests for follower page parsing

use followgraph_core::error::ParseError;
use followgraph_core::parse::{SANITIZED_FIELDS, parse_follower_page, sanitize_string_fields};

const CLEAN_PAGE: &str = r#"{
    "paging": {"is_end": false, "totals": 25, "next": "https://example.com/next"},
    "data": [
        {"id": "a1", "url_token": "ann", "name": "Ann", "headline": "Rustacean", "gender": 0,
         "avatar_url": "https://pic.example.com/a1.jpg", "type": "people",
         "is_advertiser": false, "is_org": false,
         "follower_count": 12, "answer_count": 3, "articles_count": 1},
        {"id": "b2", "url_token": "bob", "name": "Bob", "headline": "", "gender": 1}
    ]
}"#;

// ============================================================================
// Structural Decoding Tests
// ============================================================================

#[test]
fn test_parse_clean_page() {
    let page = parse_follower_page(CLEAN_PAGE).unwrap();

    assert_eq!(page.total_count, 25);
    assert_eq!(page.is_end, Some(false));
    assert_eq!(page.records.len(), 2);

    let ann = &page.records[0];
    assert_eq!(ann.id, "a1");
    assert_eq!(ann.url_token, "ann");
    assert_eq!(ann.headline, "Rustacean");
    assert_eq!(ann.user_type.as_deref(), Some("people"));
    assert_eq!(ann.follower_count, 12);
    assert_eq!(ann.articles_count, 1);

    assert_eq!(page.records[1].url_token, "bob");
    assert_eq!(page.records[1].avatar_url, None);
}

#[test]
fn test_parse_preserves_record_order() {
    let page = parse_follower_page(CLEAN_PAGE).unwrap();
    let ids: Vec<&str> = page.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "b2"]);
}

#[test]
fn test_parse_empty_page() {
    let page = parse_follower_page(r#"{"paging":{"totals":0,"is_end":true},"data":[]}"#).unwrap();
    assert_eq!(page.total_count, 0);
    assert!(page.records.is_empty());
}

#[test]
fn test_parse_without_is_end() {
    let page = parse_follower_page(r#"{"paging":{"totals":3},"data":[]}"#).unwrap();
    assert_eq!(page.is_end, None);
}

// ============================================================================
// Sanitization Tests
// ============================================================================

#[test]
fn test_parse_headline_with_embedded_quotes() {
    let body = r#"{"paging":{"totals":1},"data":[
        {"id":"q1","url_token":"quoter","name":"Q","headline":"I love "Rust" and "Go"","gender":1}
    ]}"#;

    let page = parse_follower_page(body).unwrap();
    assert_eq!(page.records[0].headline, "I love Rust and Go");
    assert_eq!(page.records[0].name, "Q");
}

#[test]
fn test_parse_url_token_with_embedded_quote() {
    let body = r#"{"paging":{"totals":1},"data":[{"id":"q2","url_token":"we"ird","headline":"x"}]}"#;

    let page = parse_follower_page(body).unwrap();
    assert_eq!(page.records[0].url_token, "weird");
}

#[test]
fn test_parse_headline_as_last_field() {
    let body = r#"{"paging":{"totals":1},"data":[{"id":"q3","url_token":"last","headline":"ends with "quote""}]}"#;

    let page = parse_follower_page(body).unwrap();
    assert_eq!(page.records[0].headline, "ends with quote");
}

#[test]
fn test_sanitize_fields_constant() {
    assert_eq!(SANITIZED_FIELDS, &["headline", "url_token"]);
}

#[test]
fn test_sanitize_does_not_touch_other_fields() {
    let body = r#"{"name":"say \"hi\"","headline":"a"b"}"#;
    let sanitized = sanitize_string_fields(body, SANITIZED_FIELDS);
    assert_eq!(sanitized, r#"{"name":"say \"hi\"","headline":"ab"}"#);
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
fn test_parse_empty_body() {
    assert!(matches!(parse_follower_page(""), Err(ParseError::Empty)));
    assert!(matches!(parse_follower_page("   \n"), Err(ParseError::Empty)));
}

#[test]
fn test_parse_not_json() {
    assert!(matches!(
        parse_follower_page("<html>blocked</html>"),
        Err(ParseError::Malformed(_))
    ));
}

#[test]
fn test_parse_missing_totals() {
    let result = parse_follower_page(r#"{"paging":{},"data":[]}"#);
    assert!(matches!(result, Err(ParseError::Malformed(_))));
}

#[test]
fn test_parse_missing_data() {
    let result = parse_follower_page(r#"{"paging":{"totals":3}}"#);
    assert!(matches!(result, Err(ParseError::Malformed(_))));
}

#[test]
fn test_parse_record_without_id() {
    let result = parse_follower_page(r#"{"paging":{"totals":1},"data":[{"url_token":"x"}]}"#);
    assert!(matches!(result, Err(ParseError::Malformed(_))));
}

#[test]
fn test_parse_negative_totals() {
    let result = parse_follower_page(r#"{"paging":{"totals":-1},"data":[]}"#);
    assert!(matches!(result, Err(ParseError::Malformed(_))));
}
