use tracing::debug;

use topicgraph_common::{Topic, TopicSet};

/// Union extractor output with one single-keyword topic per hashtag.
///
/// Deduplication is by topic equality, so `#Sports` next to an extracted
/// `Topic(["sports"])` yields one entry. Hashtags that normalize to nothing are
/// skipped.
pub fn assemble(extracted: TopicSet, hashtags: &[String]) -> TopicSet {
    let mut topics = extracted;
    for tag in hashtags {
        match Topic::keyword(tag) {
            Some(topic) => {
                topics.insert(topic);
            }
            None => debug!(hashtag = tag.as_str(), "Skipping empty hashtag"),
        }
    }
    topics
}
