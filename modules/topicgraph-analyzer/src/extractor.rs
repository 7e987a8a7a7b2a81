//! Topic Extractor boundary and the built-in keyword extractor.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use topicgraph_common::{Topic, TopicSet};

use crate::filter::FilterChain;

/// Derives zero or more topics from post text.
///
/// Implementations may be slow (seconds) and may fail; an empty set is a valid
/// answer, not a failure. Callers treat `Err` as a per-message extraction
/// failure.
#[async_trait]
pub trait TopicExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<TopicSet>;
}

/// Default number of words in the keyword topic.
pub const DEFAULT_TOP_WORDS: usize = 3;

/// Minimum length of a token counted for the keyword topic.
const MIN_KEYWORD_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "get", "got", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "let", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word.to_ascii_lowercase().as_str())
}

/// Rule-based extractor that needs no external service.
///
/// Produces one topic per run of capitalized words (a cheap named-entity
/// stand-in) plus one topic built from the most frequent content words.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    filters: FilterChain,
    top_words: usize,
}

impl KeywordExtractor {
    pub fn new(filters: FilterChain) -> Self {
        Self {
            filters,
            top_words: DEFAULT_TOP_WORDS,
        }
    }

    pub fn with_top_words(mut self, top_words: usize) -> Self {
        self.top_words = top_words;
        self
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(FilterChain::default())
    }
}

#[async_trait]
impl TopicExtractor for KeywordExtractor {
    async fn extract(&self, text: &str) -> Result<TopicSet> {
        if !text.is_ascii() {
            warn!("Non-ASCII post text, skipping keyword extraction");
            return Ok(TopicSet::new());
        }

        let filtered = self.filters.apply(text);
        let top_words = self.top_words;
        let topics = tokio::task::spawn_blocking(move || analyze(&filtered, top_words))
            .await
            .context("keyword analysis task failed")?;

        debug!(topics = topics.len(), "Keyword extraction complete");
        Ok(topics)
    }
}

/// Pure analysis over already-filtered text.
pub fn analyze(text: &str, top_words: usize) -> TopicSet {
    let mut topics: TopicSet = entity_runs(text)
        .iter()
        .filter_map(|run| Topic::keyword(run))
        .collect();

    if let Some(topic) = keyword_topic(text, top_words) {
        topics.insert(topic);
    }
    topics
}

/// Runs of consecutive capitalized, non-stopword words within a sentence,
/// joined by a space. A lone capitalized word at the start of a sentence is
/// ignored since its capital is positional.
fn entity_runs(text: &str) -> Vec<String> {
    let mut runs = Vec::new();

    for sentence in text.split(['.', '!', '?', '\n']) {
        let mut current: Vec<&str> = Vec::new();
        let mut run_starts_sentence = false;

        let mut flush = |current: &mut Vec<&str>, starts_sentence: bool| {
            if current.len() > 1 || (current.len() == 1 && !starts_sentence) {
                runs.push(current.join(" "));
            }
            current.clear();
        };

        for (position, raw) in sentence.split_whitespace().enumerate() {
            let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
            let breaks_after = raw.ends_with([',', ';', ':']);

            if is_capitalized(word) && !is_stopword(word) {
                if current.is_empty() {
                    run_starts_sentence = position == 0;
                }
                current.push(word);
            } else {
                flush(&mut current, run_starts_sentence);
            }

            if breaks_after {
                flush(&mut current, run_starts_sentence);
            }
        }
        flush(&mut current, run_starts_sentence);
    }

    runs
}

fn is_capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.is_ascii_uppercase() && chars.all(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

/// The `top_words` most frequent content words (ties broken by first
/// occurrence) as a single topic tuple.
fn keyword_topic(text: &str, top_words: usize) -> Option<Topic> {
    if top_words == 0 {
        return None;
    }

    // word -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let words = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| w.len() >= MIN_KEYWORD_LEN)
        .map(str::to_ascii_lowercase)
        .filter(|w| !is_stopword(w));

    for (position, word) in words.enumerate() {
        counts
            .entry(word)
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, position));
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|(_, (ca, pa)), (_, (cb, pb))| cb.cmp(ca).then(pa.cmp(pb)));

    Topic::new(ranked.into_iter().take(top_words).map(|(word, _)| word))
}
