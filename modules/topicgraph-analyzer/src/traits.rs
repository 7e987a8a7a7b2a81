// Trait seams for the pipeline's two external systems.
//
// TopicStore: create-if-absent writes into the author/topic graph.
// MessageAcker: settles one broker delivery.
//
// Both have in-memory mocks in `testing`, so the whole pipeline runs in unit
// tests without Neo4j or a broker.

use anyhow::Result;
use async_trait::async_trait;

use topicgraph_common::{Author, RelationshipType, Topic};
use topicgraph_graph::TopicWriter;

// ---------------------------------------------------------------------------
// TopicStore
// ---------------------------------------------------------------------------

/// Idempotent graph writes. Every method must be a no-op when the entity
/// already exists by key, and must be safe to call concurrently.
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn ensure_author_node(&self, author: &Author) -> Result<()>;

    async fn ensure_topic_node(&self, topic: &Topic) -> Result<()>;

    /// Both endpoints must already exist.
    async fn ensure_edge(
        &self,
        author: &Author,
        topic: &Topic,
        relationship: RelationshipType,
    ) -> Result<()>;
}

#[async_trait]
impl TopicStore for TopicWriter {
    async fn ensure_author_node(&self, author: &Author) -> Result<()> {
        Ok(self.ensure_author(author).await?)
    }

    async fn ensure_topic_node(&self, topic: &Topic) -> Result<()> {
        Ok(self.ensure_topic(topic).await?)
    }

    async fn ensure_edge(
        &self,
        author: &Author,
        topic: &Topic,
        relationship: RelationshipType,
    ) -> Result<()> {
        Ok(TopicWriter::ensure_edge(self, &author.id, topic, relationship).await?)
    }
}

// ---------------------------------------------------------------------------
// MessageAcker
// ---------------------------------------------------------------------------

/// Settles one delivery with the broker. Exactly one of these is called per
/// message; a message never settled is redelivered once the channel closes.
#[async_trait]
pub trait MessageAcker: Send + Sync {
    async fn ack(&self) -> Result<()>;

    /// `requeue = false` hands the message to the queue's dead-letter exchange
    /// when one is configured, or drops it.
    async fn reject(&self, requeue: bool) -> Result<()>;
}
