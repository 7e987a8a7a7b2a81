//! One message's unit of work: decode -> extract -> assemble -> ingest.
//!
//! Steps run strictly in order. Each failure is classified into the
//! [`IngestError`] variant for the stage that produced it; the coordinator
//! decides what to tell the broker.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use topicgraph_common::{IngestError, RelationshipType};

use crate::assembler::assemble;
use crate::decoder::decode_post;
use crate::extractor::TopicExtractor;
use crate::ingest::GraphIngestor;

/// Per-message processing stage. `Acknowledged` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoding,
    Extracting,
    Assembling,
    Ingesting,
    Acknowledged,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Decoding => "decoding",
            Stage::Extracting => "extracting",
            Stage::Assembling => "assembling",
            Stage::Ingesting => "ingesting",
            Stage::Acknowledged => "acknowledged",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a successful pass wrote, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPost {
    pub post_id: Option<String>,
    pub author_id: String,
    pub relationship: RelationshipType,
    pub topics: usize,
}

/// Decodes, extracts, assembles and ingests a single message body.
pub struct PostPipeline {
    extractor: Arc<dyn TopicExtractor>,
    ingestor: GraphIngestor,
}

impl PostPipeline {
    pub fn new(extractor: Arc<dyn TopicExtractor>, ingestor: GraphIngestor) -> Self {
        Self {
            extractor,
            ingestor,
        }
    }

    pub async fn process(&self, body: &[u8]) -> Result<ProcessedPost, IngestError> {
        debug!(stage = %Stage::Decoding, bytes = body.len(), "Processing message");
        let post = decode_post(body)?;
        let author_id = post.author.id.as_str();

        debug!(stage = %Stage::Extracting, author_id, "Extracting topics");
        let extracted = self.extractor.extract(&post.text).await.map_err(|e| {
            warn!(author_id, error = %format!("{e:#}"), "Topic extraction failed");
            IngestError::ExtractionFailed(format!("{e:#}"))
        })?;

        debug!(
            stage = %Stage::Assembling,
            author_id,
            extracted = extracted.len(),
            hashtags = post.hashtags.len(),
            "Assembling topics"
        );
        let topics = assemble(extracted, &post.hashtags);

        let relationship = post.relationship();
        debug!(stage = %Stage::Ingesting, author_id, topics = topics.len(), "Writing to graph");
        if let Err(e) = self.ingestor.ingest(&post.author, &topics, relationship).await {
            warn!(author_id, error = %e, "Graph ingest failed");
            return Err(e);
        }

        Ok(ProcessedPost {
            post_id: post.id.clone(),
            author_id: post.author.id.clone(),
            relationship,
            topics: topics.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{status_json, topic, MemoryTopicStore, MockExtractor};
    use topicgraph_common::TopicSet;

    fn pipeline(extractor: MockExtractor, store: Arc<MemoryTopicStore>) -> PostPipeline {
        PostPipeline::new(Arc::new(extractor), GraphIngestor::new(store))
    }

    #[tokio::test]
    async fn sports_scenario_builds_expected_graph() {
        let store = Arc::new(MemoryTopicStore::new());
        let p = pipeline(MockExtractor::new(), store.clone());
        let body = status_json("great match today #sports", "u1", false, &["sports"]);

        let processed = p.process(&body).await.unwrap();
        assert_eq!(processed.author_id, "u1");
        assert_eq!(processed.relationship, RelationshipType::Authored);
        assert_eq!(processed.topics, 1);

        assert_eq!(store.author_count(), 1);
        assert_eq!(store.topic_count(), 1);
        assert!(store.has_edge("u1", &topic(&["sports"]), RelationshipType::Authored));

        let before = store.snapshot();
        p.process(&body).await.unwrap();
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn reshare_uses_reshared_edges_only() {
        let store = Arc::new(MemoryTopicStore::new());
        let extractor = MockExtractor::new().on_text(
            "RT goal",
            TopicSet::from([topic(&["goal"]), topic(&["football"])]),
        );
        let p = pipeline(extractor, store.clone());

        p.process(&status_json("RT goal", "u2", true, &["match"]))
            .await
            .unwrap();

        assert_eq!(store.edge_count_of(RelationshipType::Reshared), 3);
        assert_eq!(store.edge_count_of(RelationshipType::Authored), 0);
    }

    #[tokio::test]
    async fn malformed_body_fails_before_extraction() {
        let store = Arc::new(MemoryTopicStore::new());
        let extractor = MockExtractor::new();
        let calls = extractor.call_counter();
        let p = pipeline(extractor, store.clone());

        let err = p.process(b"{not json").await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedMessage(_)));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(store.author_count(), 0);
    }

    #[tokio::test]
    async fn extraction_failure_writes_nothing() {
        let store = Arc::new(MemoryTopicStore::new());
        let p = pipeline(MockExtractor::new().fail_on("boom"), store.clone());

        let err = p
            .process(&status_json("boom", "u1", false, &["tag"]))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::ExtractionFailed(_)));
        assert_eq!(store.author_count(), 0);
        assert_eq!(store.topic_count(), 0);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Received.to_string(), "received");
        assert_eq!(Stage::Failed.to_string(), "failed");
    }
}
