//! Text preprocessing applied before topic extraction.
//!
//! A [`FilterChain`] is an ordered list of pure string transforms; each step
//! sees the previous step's output.

/// One preprocessing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFilter {
    /// Drop every whitespace-separated token that starts with the prefix.
    DropPrefixedTokens(String),
    /// Strip a marker at the very start of the text, plus any `:` and
    /// whitespace that follows it. Only matches a whole word.
    StripLeadingMarker { marker: String, ignore_case: bool },
}

impl TextFilter {
    pub fn drop_prefixed(prefix: &str) -> Self {
        TextFilter::DropPrefixedTokens(prefix.to_string())
    }

    pub fn strip_leading(marker: &str, ignore_case: bool) -> Self {
        TextFilter::StripLeadingMarker {
            marker: marker.to_string(),
            ignore_case,
        }
    }

    pub fn apply(&self, input: &str) -> String {
        match self {
            TextFilter::DropPrefixedTokens(prefix) => input
                .lines()
                .map(|line| {
                    line.split_whitespace()
                        .filter(|token| !token.starts_with(prefix.as_str()))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect::<Vec<_>>()
                .join("\n"),
            TextFilter::StripLeadingMarker {
                marker,
                ignore_case,
            } => strip_leading_marker(input, marker, *ignore_case).to_string(),
        }
    }
}

fn strip_leading_marker<'a>(input: &'a str, marker: &str, ignore_case: bool) -> &'a str {
    let trimmed = input.trim_start();
    let Some(head) = trimmed.get(..marker.len()) else {
        return input;
    };

    let matches = if ignore_case {
        head.eq_ignore_ascii_case(marker)
    } else {
        head == marker
    };
    if !matches {
        return input;
    }

    let rest = &trimmed[marker.len()..];
    if rest.chars().next().is_some_and(char::is_alphanumeric) {
        // "RTX ..." is a word, not a marker.
        return input;
    }
    rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace())
}

/// Ordered sequence of [`TextFilter`] steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    steps: Vec<TextFilter>,
}

impl FilterChain {
    pub fn new(steps: Vec<TextFilter>) -> Self {
        Self { steps }
    }

    /// Hashtags, mentions and links are removed, then a leading retweet marker.
    pub fn tweet_default() -> Self {
        Self::new(vec![
            TextFilter::drop_prefixed("#"),
            TextFilter::drop_prefixed("@"),
            TextFilter::drop_prefixed("http"),
            TextFilter::strip_leading("RT", false),
        ])
    }

    pub fn steps(&self) -> &[TextFilter] {
        &self.steps
    }

    pub fn apply(&self, input: &str) -> String {
        self.steps
            .iter()
            .fold(input.to_string(), |text, step| step.apply(&text))
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::tweet_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_prefixed_tokens_per_line() {
        let f = TextFilter::drop_prefixed("#");
        assert_eq!(f.apply("great #match today\n#sports rules"), "great today\nrules");
    }

    #[test]
    fn strips_leading_marker_case_sensitively() {
        let f = TextFilter::strip_leading("RT", false);
        assert_eq!(f.apply("RT: big news"), "big news");
        assert_eq!(f.apply("  RT big news"), "big news");
        assert_eq!(f.apply("rt big news"), "rt big news");
        assert_eq!(f.apply("RTX launch"), "RTX launch");
        assert_eq!(f.apply("news RT later"), "news RT later");
    }

    #[test]
    fn strip_ignoring_case() {
        let f = TextFilter::strip_leading("RT", true);
        assert_eq!(f.apply("rt big news"), "big news");
    }

    #[test]
    fn marker_longer_than_input_is_a_noop() {
        let f = TextFilter::strip_leading("RT", false);
        assert_eq!(f.apply("R"), "R");
        assert_eq!(f.apply(""), "");
    }

    #[test]
    fn default_chain_cleans_a_retweet() {
        let chain = FilterChain::default();
        assert_eq!(chain.steps().len(), 4);
        assert_eq!(
            chain.apply("RT @nasa: Launch window opens http://t.co/x #space"),
            "Launch window opens"
        );
    }

    #[test]
    fn empty_chain_is_identity() {
        let chain = FilterChain::new(vec![]);
        assert_eq!(chain.apply("as is"), "as is");
    }
}
