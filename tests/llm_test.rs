//! Parsing model replies into structured output.

use leadpress::llm::parse_json_reply;
use leadpress::model::work::SeoFields;

#[test]
fn parses_bare_json() {
    let seo: SeoFields = parse_json_reply(
        r#"{"keyword":"pho","title":"Beef Pho","description":"Slow broth.","category":null}"#,
    )
    .unwrap();
    assert_eq!(seo.keyword, "pho");
    assert_eq!(seo.category, None);
}

#[test]
fn tolerates_fences_and_prose() {
    let reply = "Here you go:\n```json\n{\"keyword\": \"pho\", \"title\": \"Beef Pho\", \
                 \"description\": \"Slow broth.\", \"category\": \"Soups\"}\n```\nEnjoy!";
    let seo: SeoFields = parse_json_reply(reply).unwrap();
    assert_eq!(seo.title, "Beef Pho");
    assert_eq!(seo.category.as_deref(), Some("Soups"));
}

#[test]
fn truncated_reply_is_an_error() {
    let reply = "```json\n{\"keyword\": \"pho\", \"title\": \"Beef";
    assert!(parse_json_reply::<SeoFields>(reply).is_err());
}

#[test]
fn no_json_is_an_error() {
    assert!(parse_json_reply::<SeoFields>("I cannot help with that.").is_err());
}
