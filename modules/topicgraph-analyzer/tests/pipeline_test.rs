//! Pipeline runs with the built-in keyword extractor against the in-memory store.

use std::sync::Arc;

use topicgraph_analyzer::extractor::KeywordExtractor;
use topicgraph_analyzer::ingest::GraphIngestor;
use topicgraph_analyzer::pipeline::PostPipeline;
use topicgraph_analyzer::testing::{status_json, topic, MemoryTopicStore};
use topicgraph_common::{IngestError, RelationshipType, Topic};

fn pipeline(store: Arc<MemoryTopicStore>) -> PostPipeline {
    PostPipeline::new(
        Arc::new(KeywordExtractor::default()),
        GraphIngestor::new(store),
    )
}

#[tokio::test]
async fn reshare_with_markers_yields_filtered_topics() {
    let store = Arc::new(MemoryTopicStore::new());
    let p = pipeline(store.clone());

    let body = status_json(
        "RT @fan: visiting Vienna with Anna Schmidt #travel http://t.co/x",
        "u9",
        true,
        &["travel"],
    );
    let processed = p.process(&body).await.unwrap();

    assert_eq!(processed.relationship, RelationshipType::Reshared);
    assert_eq!(processed.topics, 4);

    let vienna = Topic::keyword("Vienna").unwrap();
    let anna = Topic::keyword("Anna Schmidt").unwrap();
    let keywords = topic(&["visiting", "vienna", "anna"]);
    for t in [&vienna, &anna, &keywords, &topic(&["travel"])] {
        assert!(store.has_edge("u9", t, RelationshipType::Reshared), "missing {t}");
    }
    assert_eq!(store.edge_count_of(RelationshipType::Authored), 0);
}

#[tokio::test]
async fn non_ascii_text_keeps_hashtag_topics() {
    let store = Arc::new(MemoryTopicStore::new());
    let p = pipeline(store.clone());

    let processed = p
        .process(&status_json("café au lait #coffee", "u1", false, &["coffee"]))
        .await
        .unwrap();

    assert_eq!(processed.topics, 1);
    assert_eq!(store.topic_count(), 1);
    assert!(store.has_edge("u1", &topic(&["coffee"]), RelationshipType::Authored));
}

#[tokio::test]
async fn post_without_topics_still_records_author() {
    let store = Arc::new(MemoryTopicStore::new());
    let p = pipeline(store.clone());

    let processed = p
        .process(&status_json("@friend http://t.co/abc", "u1", false, &[]))
        .await
        .unwrap();

    assert_eq!(processed.topics, 0);
    assert_eq!(store.author_count(), 1);
    assert_eq!(store.edge_count(), 0);
}

#[tokio::test]
async fn missing_author_is_malformed() {
    let store = Arc::new(MemoryTopicStore::new());
    let p = pipeline(store.clone());

    let err = p
        .process(br#"{"id_str":"1","text":"no user here"}"#)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::MalformedMessage(_)));
    assert_eq!(store.author_count(), 0);
}
