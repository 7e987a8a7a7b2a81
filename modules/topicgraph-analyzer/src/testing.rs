// Test mocks for the ingestion pipeline.
//
// Three mocks matching the trait boundaries:
// - MockExtractor (TopicExtractor): text -> result map, with failures, delays
//   and in-flight tracking
// - MemoryTopicStore (TopicStore): stateful in-memory graph
// - AckLog / RecordingAcker (MessageAcker): records how each delivery settled
//
// Plus helpers for building status payloads and inbound messages.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::Stream;

use topicgraph_common::{Author, RelationshipType, Topic, TopicSet};

use crate::coordinator::InboundMessage;
use crate::extractor::TopicExtractor;
use crate::traits::{MessageAcker, TopicStore};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn author(id: &str) -> Author {
    Author {
        id: id.to_string(),
        display_name: format!("User {id}"),
        screen_name: Some(id.to_string()),
    }
}

pub fn topic(words: &[&str]) -> Topic {
    Topic::new(words.iter().copied()).expect("test topic needs a keyword")
}

/// Minimal Twitter status JSON body.
pub fn status_json(text: &str, author_id: &str, is_reshare: bool, hashtags: &[&str]) -> Vec<u8> {
    let mut status = serde_json::json!({
        "id_str": format!("{author_id}-{}", text.len()),
        "text": text,
        "user": {
            "id_str": author_id,
            "name": format!("User {author_id}"),
            "screen_name": author_id,
        },
        "entities": {
            "hashtags": hashtags
                .iter()
                .map(|h| serde_json::json!({ "text": h }))
                .collect::<Vec<_>>(),
        },
    });
    if is_reshare {
        status["retweeted_status"] = serde_json::json!({ "text": text });
    }
    serde_json::to_vec(&status).expect("serialize status")
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Map-based extractor. Unregistered texts yield an empty set.
/// Builder pattern: `.on_text()`, `.fail_on()`, `.panic_on()`, `.delay_on()`.
pub struct MockExtractor {
    results: HashMap<String, TopicSet>,
    failures: HashSet<String>,
    panics: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            failures: HashSet::new(),
            panics: HashSet::new(),
            delays: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn on_text(mut self, text: &str, topics: TopicSet) -> Self {
        self.results.insert(text.to_string(), topics);
        self
    }

    pub fn fail_on(mut self, text: &str) -> Self {
        self.failures.insert(text.to_string());
        self
    }

    pub fn panic_on(mut self, text: &str) -> Self {
        self.panics.insert(text.to_string());
        self
    }

    pub fn delay_on(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Total `extract` calls so far.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Highest number of concurrent `extract` calls observed.
    pub fn max_in_flight(&self) -> Arc<AtomicUsize> {
        self.max_in_flight.clone()
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicExtractor for MockExtractor {
    async fn extract(&self, text: &str) -> Result<TopicSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.contains(text) {
            panic!("MockExtractor: panic registered for {text:?}");
        }
        if self.failures.contains(text) {
            bail!("MockExtractor: failure registered for {text:?}");
        }
        Ok(self.results.get(text).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryTopicStore
// ---------------------------------------------------------------------------

/// Point-in-time copy of the in-memory graph, comparable with `==`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    /// author id -> display name
    pub authors: BTreeMap<String, String>,
    pub topics: BTreeSet<String>,
    pub edges: BTreeSet<(String, String, RelationshipType)>,
}

/// Stateful in-memory graph with the same create-if-absent semantics as the
/// Neo4j writer, including the missing-endpoint check on edges.
pub struct MemoryTopicStore {
    graph: Mutex<GraphSnapshot>,
    fail_writes: AtomicBool,
}

impl MemoryTopicStore {
    pub fn new() -> Self {
        Self {
            graph: Mutex::new(GraphSnapshot::default()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail, as if the store were down.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.lock().unwrap().clone()
    }

    pub fn author_count(&self) -> usize {
        self.graph.lock().unwrap().authors.len()
    }

    pub fn topic_count(&self) -> usize {
        self.graph.lock().unwrap().topics.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.lock().unwrap().edges.len()
    }

    pub fn edge_count_of(&self, relationship: RelationshipType) -> usize {
        self.graph
            .lock()
            .unwrap()
            .edges
            .iter()
            .filter(|(_, _, r)| *r == relationship)
            .count()
    }

    pub fn has_edge(&self, author_id: &str, topic: &Topic, relationship: RelationshipType) -> bool {
        self.graph.lock().unwrap().edges.contains(&(
            author_id.to_string(),
            topic.key(),
            relationship,
        ))
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("MemoryTopicStore: store unavailable");
        }
        Ok(())
    }
}

impl Default for MemoryTopicStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicStore for MemoryTopicStore {
    async fn ensure_author_node(&self, author: &Author) -> Result<()> {
        self.check_available()?;
        self.graph
            .lock()
            .unwrap()
            .authors
            .insert(author.id.clone(), author.display_name.clone());
        Ok(())
    }

    async fn ensure_topic_node(&self, topic: &Topic) -> Result<()> {
        self.check_available()?;
        self.graph.lock().unwrap().topics.insert(topic.key());
        Ok(())
    }

    async fn ensure_edge(
        &self,
        author: &Author,
        topic: &Topic,
        relationship: RelationshipType,
    ) -> Result<()> {
        self.check_available()?;
        let mut graph = self.graph.lock().unwrap();
        let key = topic.key();
        if !graph.authors.contains_key(&author.id) || !graph.topics.contains(&key) {
            bail!("MemoryTopicStore: endpoint missing for {} -> {key}", author.id);
        }
        graph.edges.insert((author.id.clone(), key, relationship));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AckLog / RecordingAcker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Requeue,
    DeadLetter,
}

/// Shared record of how each delivery tag was settled.
#[derive(Clone, Default)]
pub struct AckLog {
    entries: Arc<Mutex<Vec<(u64, Settlement)>>>,
}

impl AckLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acker(&self, delivery_tag: u64) -> Box<dyn MessageAcker> {
        Box::new(RecordingAcker {
            delivery_tag,
            entries: self.entries.clone(),
        })
    }

    /// Build an unsettled message whose acker records into this log.
    pub fn message(&self, delivery_tag: u64, body: Vec<u8>) -> InboundMessage {
        InboundMessage {
            delivery_tag,
            body,
            redelivered: false,
            delivery_count: None,
            acker: self.acker(delivery_tag),
        }
    }

    pub fn entries(&self) -> Vec<(u64, Settlement)> {
        self.entries.lock().unwrap().clone()
    }

    /// All settlements recorded for one tag, in order.
    pub fn settlements_of(&self, delivery_tag: u64) -> Vec<Settlement> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(tag, _)| *tag == delivery_tag)
            .map(|(_, s)| *s)
            .collect()
    }
}

pub struct RecordingAcker {
    delivery_tag: u64,
    entries: Arc<Mutex<Vec<(u64, Settlement)>>>,
}

#[async_trait]
impl MessageAcker for RecordingAcker {
    async fn ack(&self) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .push((self.delivery_tag, Settlement::Ack));
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        let settlement = if requeue {
            Settlement::Requeue
        } else {
            Settlement::DeadLetter
        };
        self.entries
            .lock()
            .unwrap()
            .push((self.delivery_tag, settlement));
        Ok(())
    }
}

/// A finite delivery stream over prepared messages.
pub fn delivery_stream(
    messages: Vec<InboundMessage>,
) -> impl Stream<Item = Result<InboundMessage>> + Send + 'static {
    futures::stream::iter(messages.into_iter().map(Ok))
}
