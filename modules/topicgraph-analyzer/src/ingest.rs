use std::sync::Arc;

use tracing::debug;

use topicgraph_common::{Author, IngestError, RelationshipType, TopicSet};

use crate::traits::TopicStore;

/// Writes one post's author, topics and edges as a sequence of idempotent
/// ensure operations.
///
/// The sequence is not atomic: a failure part-way leaves earlier writes in
/// place. That is safe because the message is not acknowledged and the
/// redelivered copy repeats the same create-if-absent writes.
#[derive(Clone)]
pub struct GraphIngestor {
    store: Arc<dyn TopicStore>,
}

impl GraphIngestor {
    pub fn new(store: Arc<dyn TopicStore>) -> Self {
        Self { store }
    }

    pub async fn ingest(
        &self,
        author: &Author,
        topics: &TopicSet,
        relationship: RelationshipType,
    ) -> Result<(), IngestError> {
        self.store
            .ensure_author_node(author)
            .await
            .map_err(|e| graph_write_failed("author node", e))?;

        for topic in topics {
            self.store
                .ensure_topic_node(topic)
                .await
                .map_err(|e| graph_write_failed("topic node", e))?;
        }

        for topic in topics {
            self.store
                .ensure_edge(author, topic, relationship)
                .await
                .map_err(|e| graph_write_failed("edge", e))?;
        }

        debug!(
            author_id = author.id.as_str(),
            topics = topics.len(),
            %relationship,
            "Post ingested"
        );
        Ok(())
    }
}

fn graph_write_failed(what: &str, e: anyhow::Error) -> IngestError {
    IngestError::GraphWriteFailed(format!("{what}: {e:#}"))
}
