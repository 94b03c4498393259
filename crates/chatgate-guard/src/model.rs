//! Topic models scoring text against candidate labels

use crate::relevance::TopicScores;
use aho_corasick::AhoCorasick;
use chatgate_core::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Confidence contributed by each distinct keyword hit
const HIT_CONFIDENCE: f32 = 0.7;

/// An opaque zero-shot scorer.
///
/// Implementations may be slow and CPU-bound; they are always called from
/// the blocking pool, never from an async worker thread.
pub trait TopicModel: Send + Sync {
    /// Model name (for logging/debugging)
    fn name(&self) -> &str;

    /// Score `text` against each candidate label, every score in `[0, 1]`
    fn score(&self, text: &str, candidate_labels: &[String]) -> Result<TopicScores>;
}

/// Keyword-spotting topic model built on Aho-Corasick.
///
/// Each label owns a keyword list (its own name is always included).
/// Keywords match case-insensitively as whole words, optionally followed by
/// a plural `s` or `es`: `shirt` matches `shirts`, but `wear` does not
/// match `swear` and `hat` does not match `hate`. A label with
/// `n` distinct keyword hits scores `1 - 0.3^n`; labels without hits score
/// zero.
pub struct KeywordTopicModel {
    matcher: AhoCorasick,
    pattern_labels: Vec<String>,
}

impl KeywordTopicModel {
    /// Build a model for `labels`, extended by the per-label `topic_keywords`
    pub fn new<'a>(
        labels: impl IntoIterator<Item = &'a str>,
        topic_keywords: &HashMap<String, Vec<String>>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut pattern_labels = Vec::new();
        let mut patterns = Vec::new();

        let mut add = |label: &str, keyword: &str| {
            let keyword = keyword.trim().to_lowercase();
            if keyword.is_empty() || !seen.insert((label.to_string(), keyword.clone())) {
                return;
            }
            pattern_labels.push(label.to_string());
            patterns.push(keyword);
        };

        for label in labels {
            add(label, label);
        }
        for (label, words) in topic_keywords {
            add(label, label);
            for word in words {
                add(label, word);
            }
        }

        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&patterns)
            .map_err(|e| Error::classifier(format!("Failed to build topic keyword matcher: {}", e)))?;

        Ok(Self {
            matcher,
            pattern_labels,
        })
    }

    /// Number of distinct (label, keyword) pairs
    pub fn keyword_count(&self) -> usize {
        self.pattern_labels.len()
    }
}

impl TopicModel for KeywordTopicModel {
    fn name(&self) -> &str {
        "keyword"
    }

    fn score(&self, text: &str, candidate_labels: &[String]) -> Result<TopicScores> {
        let mut hits: HashMap<&str, HashSet<usize>> = HashMap::new();

        for m in self.matcher.find_overlapping_iter(text) {
            if !starts_word(text, m.start()) || !ends_word(text, m.end()) {
                continue;
            }
            let pattern = m.pattern().as_usize();
            hits.entry(self.pattern_labels[pattern].as_str())
                .or_default()
                .insert(pattern);
        }

        Ok(candidate_labels
            .iter()
            .map(|label| {
                let n = hits.get(label.as_str()).map_or(0, |set| set.len());
                (label.clone(), hit_confidence(n))
            })
            .collect())
    }
}

fn hit_confidence(hits: usize) -> f32 {
    1.0 - (1.0 - HIT_CONFIDENCE).powi(hits as i32)
}

fn starts_word(text: &str, start: usize) -> bool {
    text.get(..start)
        .and_then(|before| before.chars().next_back())
        .map_or(true, |c| !c.is_alphanumeric())
}

fn ends_word(text: &str, end: usize) -> bool {
    let Some(rest) = text.get(end..) else {
        return false;
    };
    PLURAL_SUFFIXES.iter().any(|suffix| {
        rest.get(..suffix.len())
            .filter(|head| head.eq_ignore_ascii_case(suffix))
            .and_then(|_| rest.get(suffix.len()..))
            .map_or(false, |after| {
                after.chars().next().map_or(true, |c| !c.is_alphanumeric())
            })
    })
}

const PLURAL_SUFFIXES: &[&str] = &["", "s", "es"];
