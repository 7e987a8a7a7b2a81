#![cfg(feature = "test-utils")]

// TopicWriter integration tests against a real Neo4j.
//
// Requirements: Docker (for Neo4j via testcontainers)
//
// Run with: cargo test -p topicgraph-graph --features test-utils --test writer_test

use topicgraph_common::{Author, RelationshipType, Topic};
use topicgraph_graph::{query, GraphClient, GraphCounts, TopicWriter, WriteError};

async fn setup() -> (impl std::any::Any, GraphClient) {
    topicgraph_graph::testutil::neo4j_container().await
}

fn author(id: &str, name: &str) -> Author {
    Author {
        id: id.to_string(),
        display_name: name.to_string(),
        screen_name: Some(name.to_lowercase()),
    }
}

fn topic(words: &[&str]) -> Topic {
    Topic::new(words.iter().copied()).expect("non-empty topic")
}

async fn author_name(client: &GraphClient, id: &str) -> Option<String> {
    let q = query("MATCH (a:Author {id: $id}) RETURN a.name AS name").param("id", id);
    let mut stream = client.inner().execute(q).await.expect("query failed");
    let row = stream.next().await.expect("stream failed")?;
    row.get::<String>("name").ok()
}

#[tokio::test]
async fn ensure_calls_are_idempotent() {
    let (_c, client) = setup().await;
    let writer = TopicWriter::new(client.clone());
    let u1 = author("u1", "User");
    let sports = topic(&["sports"]);

    for _ in 0..3 {
        writer.ensure_author(&u1).await.unwrap();
        writer.ensure_topic(&sports).await.unwrap();
        writer
            .ensure_edge(&u1.id, &sports, RelationshipType::Authored)
            .await
            .unwrap();
    }

    assert_eq!(
        writer.counts().await.unwrap(),
        GraphCounts {
            authors: 1,
            topics: 1,
            authored: 1,
            reshared: 0,
        }
    );
}

#[tokio::test]
async fn edge_types_are_distinct() {
    let (_c, client) = setup().await;
    let writer = TopicWriter::new(client.clone());
    let u1 = author("u1", "User");
    let cup = topic(&["world", "cup"]);

    writer.ensure_author(&u1).await.unwrap();
    writer.ensure_topic(&cup).await.unwrap();
    writer
        .ensure_edge(&u1.id, &cup, RelationshipType::Authored)
        .await
        .unwrap();
    writer
        .ensure_edge(&u1.id, &cup, RelationshipType::Reshared)
        .await
        .unwrap();

    let counts = writer.counts().await.unwrap();
    assert_eq!(counts.authored, 1);
    assert_eq!(counts.reshared, 1);
}

#[tokio::test]
async fn repeat_sighting_refreshes_display_name() {
    let (_c, client) = setup().await;
    let writer = TopicWriter::new(client.clone());

    writer.ensure_author(&author("u1", "Old Name")).await.unwrap();
    writer.ensure_author(&author("u1", "New Name")).await.unwrap();

    assert_eq!(author_name(&client, "u1").await.as_deref(), Some("New Name"));
    assert_eq!(writer.counts().await.unwrap().authors, 1);
}

#[tokio::test]
async fn edge_without_endpoints_is_an_error() {
    let (_c, client) = setup().await;
    let writer = TopicWriter::new(client.clone());

    let err = writer
        .ensure_edge("ghost", &topic(&["nothing"]), RelationshipType::Authored)
        .await
        .unwrap_err();
    assert!(matches!(err, WriteError::MissingEndpoint { .. }));
}

#[tokio::test]
async fn concurrent_merges_do_not_duplicate_nodes() {
    let (_c, client) = setup().await;
    let writer = TopicWriter::new(client.clone());
    let u1 = author("u1", "User");
    let sports = topic(&["sports"]);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let writer = writer.clone();
            let u1 = u1.clone();
            let sports = sports.clone();
            tokio::spawn(async move {
                writer.ensure_author(&u1).await?;
                writer.ensure_topic(&sports).await?;
                writer
                    .ensure_edge(&u1.id, &sports, RelationshipType::Authored)
                    .await
            })
        })
        .collect();

    for task in tasks {
        // A constraint violation on a racing MERGE surfaces as an error; the
        // retry below mirrors message redelivery.
        if task.await.unwrap().is_err() {
            writer.ensure_author(&u1).await.unwrap();
            writer.ensure_topic(&sports).await.unwrap();
            writer
                .ensure_edge(&u1.id, &sports, RelationshipType::Authored)
                .await
                .unwrap();
        }
    }

    let counts = writer.counts().await.unwrap();
    assert_eq!(counts.authors, 1);
    assert_eq!(counts.topics, 1);
    assert_eq!(counts.authored, 1);
}
