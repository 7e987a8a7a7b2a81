//! Post Decoder: raw message body -> [`Post`].
//!
//! Bodies are Twitter v1.1 status documents. Only the fields the pipeline needs
//! are read; everything else in the payload is ignored.

use serde::Deserialize;

use topicgraph_common::{Author, IngestError, Post};

#[derive(Debug, Deserialize)]
struct RawStatus {
    id_str: Option<String>,
    id: Option<u64>,
    text: Option<String>,
    full_text: Option<String>,
    user: Option<RawUser>,
    retweeted_status: Option<serde_json::Value>,
    entities: Option<RawEntities>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id_str: Option<String>,
    id: Option<u64>,
    name: Option<String>,
    screen_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntities {
    #[serde(default)]
    hashtags: Vec<RawHashtag>,
}

#[derive(Debug, Deserialize)]
struct RawHashtag {
    text: String,
}

/// Decode a message body into a [`Post`].
///
/// Pure: fails with [`IngestError::MalformedMessage`] on non-UTF-8 bodies,
/// invalid JSON, or a status without text or author id.
pub fn decode_post(body: &[u8]) -> Result<Post, IngestError> {
    let raw = std::str::from_utf8(body)
        .map_err(|e| IngestError::MalformedMessage(format!("body is not UTF-8: {e}")))?;

    let status: RawStatus = serde_json::from_str(raw)
        .map_err(|e| IngestError::MalformedMessage(format!("invalid status JSON: {e}")))?;

    let text = status
        .full_text
        .or(status.text)
        .ok_or_else(|| IngestError::MalformedMessage("status has no text".to_string()))?;

    let user = status
        .user
        .ok_or_else(|| IngestError::MalformedMessage("status has no user".to_string()))?;

    let author_id = user
        .id_str
        .filter(|id| !id.trim().is_empty())
        .or_else(|| user.id.map(|id| id.to_string()))
        .ok_or_else(|| IngestError::MalformedMessage("status user has no id".to_string()))?;

    let display_name = user
        .name
        .clone()
        .or_else(|| user.screen_name.clone())
        .unwrap_or_else(|| author_id.clone());

    let hashtags = status
        .entities
        .unwrap_or_default()
        .hashtags
        .into_iter()
        .map(|h| h.text)
        .collect();

    Ok(Post {
        id: status.id_str.or_else(|| status.id.map(|id| id.to_string())),
        text,
        author: Author {
            id: author_id,
            display_name,
            screen_name: user.screen_name,
        },
        is_reshare: status.retweeted_status.is_some(),
        hashtags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn decodes_plain_tweet() {
        let post = decode_post(&body(json!({
            "id_str": "400000000000000001",
            "text": "great match today #sports",
            "user": {"id_str": "u1", "name": "User One", "screen_name": "userone"},
            "entities": {"hashtags": [{"text": "sports", "indices": [18, 25]}]}
        })))
        .unwrap();

        assert_eq!(post.id.as_deref(), Some("400000000000000001"));
        assert_eq!(post.text, "great match today #sports");
        assert_eq!(post.author.id, "u1");
        assert_eq!(post.author.display_name, "User One");
        assert_eq!(post.author.screen_name.as_deref(), Some("userone"));
        assert!(!post.is_reshare);
        assert_eq!(post.hashtags, vec!["sports".to_string()]);
    }

    #[test]
    fn retweeted_status_marks_reshare() {
        let post = decode_post(&body(json!({
            "text": "RT @other: hello",
            "user": {"id": 42, "screen_name": "fan"},
            "retweeted_status": {"text": "hello", "user": {"id": 7}}
        })))
        .unwrap();

        assert!(post.is_reshare);
        assert_eq!(post.author.id, "42");
        assert_eq!(post.author.display_name, "fan");
        assert!(post.hashtags.is_empty());
    }

    #[test]
    fn null_retweeted_status_is_not_a_reshare() {
        let post = decode_post(&body(json!({
            "text": "original",
            "user": {"id_str": "u1"},
            "retweeted_status": null
        })))
        .unwrap();
        assert!(!post.is_reshare);
        assert_eq!(post.author.display_name, "u1");
    }

    #[test]
    fn prefers_full_text() {
        let post = decode_post(&body(json!({
            "text": "truncated…",
            "full_text": "the whole thing",
            "user": {"id_str": "u1"}
        })))
        .unwrap();
        assert_eq!(post.text, "the whole thing");
    }

    #[test]
    fn hashtag_order_is_preserved() {
        let post = decode_post(&body(json!({
            "text": "#b #a #b",
            "user": {"id_str": "u1"},
            "entities": {"hashtags": [{"text": "b"}, {"text": "a"}, {"text": "b"}]}
        })))
        .unwrap();
        assert_eq!(post.hashtags, vec!["b", "a", "b"]);
    }

    #[test]
    fn rejects_undecodable_payloads() {
        for payload in [
            b"not json".to_vec(),
            vec![0xff, 0xfe, 0x00],
            body(json!({"user": {"id_str": "u1"}})),
            body(json!({"text": "no author"})),
            body(json!({"text": "blank id", "user": {"id_str": "  "}})),
            body(json!(["an", "array"])),
        ] {
            let err = decode_post(&payload).unwrap_err();
            assert!(
                matches!(err, IngestError::MalformedMessage(_)),
                "expected MalformedMessage, got {err:?}"
            );
        }
    }
}
