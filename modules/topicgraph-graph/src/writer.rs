use chrono::{DateTime, Utc};
use neo4rs::query;
use tracing::debug;

use topicgraph_common::{Author, RelationshipType, Topic};

use crate::GraphClient;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Neo4j(#[from] neo4rs::Error),

    #[error("cannot link author {author_id} -[{relationship}]-> topic {topic_key}: endpoint node missing")]
    MissingEndpoint {
        author_id: String,
        topic_key: String,
        relationship: RelationshipType,
    },
}

/// Node and edge totals, used for startup logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphCounts {
    pub authors: i64,
    pub topics: i64,
    pub authored: i64,
    pub reshared: i64,
}

/// Write-side wrapper for the author/topic graph.
///
/// Every write is a by-key `MERGE`, so repeating any call leaves the graph
/// unchanged apart from refreshed timestamps and author names.
#[derive(Clone)]
pub struct TopicWriter {
    client: GraphClient,
}

impl TopicWriter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Create the author node if absent; refresh its names otherwise.
    pub async fn ensure_author(&self, author: &Author) -> Result<(), WriteError> {
        let q = query(
            "MERGE (a:Author {id: $id})
             ON CREATE SET
                 a.name = $name,
                 a.screen_name = $screen_name,
                 a.first_seen = datetime($ts),
                 a.last_seen = datetime($ts)
             ON MATCH SET
                 a.name = $name,
                 a.screen_name = $screen_name,
                 a.last_seen = datetime($ts)",
        )
        .param("id", author.id.as_str())
        .param("name", author.display_name.as_str())
        .param::<Option<String>>("screen_name", author.screen_name.clone())
        .param("ts", format_datetime(&Utc::now()));

        self.client.graph.run(q).await?;
        debug!(author_id = author.id.as_str(), "Author ensured");
        Ok(())
    }

    /// Create the topic node if absent. Existing topics are left untouched.
    pub async fn ensure_topic(&self, topic: &Topic) -> Result<(), WriteError> {
        let q = query(
            "MERGE (t:Topic {key: $key})
             ON CREATE SET
                 t.keywords = $keywords,
                 t.first_seen = datetime($ts)",
        )
        .param("key", topic.key())
        .param("keywords", topic.keywords().to_vec())
        .param("ts", format_datetime(&Utc::now()));

        self.client.graph.run(q).await?;
        debug!(topic_key = topic.key().as_str(), "Topic ensured");
        Ok(())
    }

    /// Create the typed edge author -> topic if absent.
    ///
    /// Both endpoints must already exist; a missing endpoint is an error rather
    /// than a silent no-op.
    pub async fn ensure_edge(
        &self,
        author_id: &str,
        topic: &Topic,
        relationship: RelationshipType,
    ) -> Result<(), WriteError> {
        // Relationship types cannot be parameterized; the label comes from a
        // closed enum.
        let cypher = format!(
            "MATCH (a:Author {{id: $author_id}})
             MATCH (t:Topic {{key: $topic_key}})
             MERGE (a)-[r:{label}]->(t)
             ON CREATE SET r.first_seen = datetime($ts)
             RETURN count(r) AS linked",
            label = relationship.label()
        );
        let topic_key = topic.key();
        let q = query(&cypher)
            .param("author_id", author_id)
            .param("topic_key", topic_key.as_str())
            .param("ts", format_datetime(&Utc::now()));

        let mut stream = self.client.graph.execute(q).await?;
        let mut linked: i64 = 0;
        while let Some(row) = stream.next().await? {
            linked += row.get::<i64>("linked").unwrap_or(0);
        }

        if linked == 0 {
            return Err(WriteError::MissingEndpoint {
                author_id: author_id.to_string(),
                topic_key,
                relationship,
            });
        }

        debug!(author_id, topic_key = topic_key.as_str(), %relationship, "Edge ensured");
        Ok(())
    }

    /// Count authors, topics and edges of each type.
    pub async fn counts(&self) -> Result<GraphCounts, neo4rs::Error> {
        let q = query(
            "OPTIONAL MATCH (a:Author) WITH count(a) AS authors
             OPTIONAL MATCH (t:Topic) WITH authors, count(t) AS topics
             OPTIONAL MATCH (:Author)-[w:AUTHORED]->(:Topic) WITH authors, topics, count(w) AS authored
             OPTIONAL MATCH (:Author)-[s:RESHARED]->(:Topic)
             RETURN authors, topics, authored, count(s) AS reshared",
        );

        let mut stream = self.client.graph.execute(q).await?;
        let mut counts = GraphCounts::default();
        if let Some(row) = stream.next().await? {
            counts.authors = row.get("authors").unwrap_or(0);
            counts.topics = row.get("topics").unwrap_or(0);
            counts.authored = row.get("authored").unwrap_or(0);
            counts.reshared = row.get("reshared").unwrap_or(0);
        }
        Ok(counts)
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}
