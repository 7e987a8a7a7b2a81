use std::collections::BTreeSet;
use std::fmt;

/// Joins a topic's keywords into its graph key. Stripped from keywords during
/// normalization so keys stay unambiguous.
pub const TOPIC_KEY_SEPARATOR: char = '|';

// --- Posts ---

/// A decoded social media post. Lives only for one pipeline pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Platform post id, when the payload carried one. Logging only.
    pub id: Option<String>,
    pub text: String,
    pub author: Author,
    pub is_reshare: bool,
    pub hashtags: Vec<String>,
}

impl Post {
    /// Edge type this post produces between its author and each topic.
    pub fn relationship(&self) -> RelationshipType {
        if self.is_reshare {
            RelationshipType::Reshared
        } else {
            RelationshipType::Authored
        }
    }
}

/// Author identity. `id` is the stable graph key; the names are refreshed on
/// every sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub display_name: String,
    pub screen_name: Option<String>,
}

// --- Relationships ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationshipType {
    Authored,
    Reshared,
}

impl RelationshipType {
    /// Relationship type label used in the graph.
    pub fn label(&self) -> &'static str {
        match self {
            RelationshipType::Authored => "AUTHORED",
            RelationshipType::Reshared => "RESHARED",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// --- Topics ---

/// A semantic label identified by its ordered, normalized keyword tuple.
///
/// Equality and ordering are element-wise over the keywords, so two topics
/// built from differently cased or spaced input compare equal once normalized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Topic {
    keywords: Vec<String>,
}

impl Topic {
    /// Build a topic from raw keywords. Keywords that normalize to nothing are
    /// dropped; returns `None` when no keyword survives.
    pub fn new<I, S>(keywords: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| normalize_keyword(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            None
        } else {
            Some(Self { keywords })
        }
    }

    /// Single-keyword topic, e.g. from a hashtag.
    pub fn keyword(word: &str) -> Option<Self> {
        Self::new([word])
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Deterministic graph key: keywords joined by [`TOPIC_KEY_SEPARATOR`].
    pub fn key(&self) -> String {
        self.keywords.join(&TOPIC_KEY_SEPARATOR.to_string())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.keywords.join(", "))
    }
}

/// Ordered set so topic assembly and graph writes are deterministic.
pub type TopicSet = BTreeSet<Topic>;

/// Trim, strip leading `#`, lowercase, collapse whitespace runs and remove the
/// key separator.
pub fn normalize_keyword(raw: &str) -> String {
    let stripped = raw.trim().trim_start_matches('#');
    stripped
        .split_whitespace()
        .map(|part| {
            part.chars()
                .filter(|c| *c != TOPIC_KEY_SEPARATOR)
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
