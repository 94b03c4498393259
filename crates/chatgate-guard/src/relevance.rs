//! Topical relevance gate
//!
//! Scores a message against candidate topics and accepts it when the
//! weighted average score is strictly above a threshold.

use crate::model::TopicModel;
use chatgate_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Per-label relevance scores in `[0, 1]`, produced fresh per classification
pub type TopicScores = HashMap<String, f32>;

/// Per-label non-negative weights supplied by configuration
pub type ReferenceWeights = HashMap<String, f32>;

/// Weight of a scored label missing from the reference weights
pub const DEFAULT_WEIGHT: f32 = 1.0;

/// Weighted mean of `scores`, using `weights` with a default of 1.0.
///
/// Returns 0.0 when there are no scores or the weights sum to zero. With
/// empty `weights` this is the plain arithmetic mean.
pub fn weighted_average(scores: &TopicScores, weights: &ReferenceWeights) -> f32 {
    let (weighted_sum, total_weight) =
        scores
            .iter()
            .fold((0.0_f32, 0.0_f32), |(sum, total), (label, score)| {
                let weight = weights.get(label).copied().unwrap_or(DEFAULT_WEIGHT);
                (sum + score * weight, total + weight)
            });

    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    }
}

/// Outcome of a relevance check
#[derive(Debug, Clone)]
pub struct Pertinence {
    /// Whether the weighted average cleared the threshold
    pub passed: bool,

    /// Raw scores from the topic model
    pub scores: TopicScores,

    /// The weighted average compared against the threshold
    pub weighted_average: f32,
}

/// Gate that asks a [`TopicModel`] whether a message is on topic
#[derive(Clone)]
pub struct RelevanceGate {
    model: Arc<dyn TopicModel>,
    candidate_labels: Arc<[String]>,
    threshold: f32,
}

impl RelevanceGate {
    pub fn new<I, S>(model: Arc<dyn TopicModel>, candidate_labels: I, threshold: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = candidate_labels.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();

        Self {
            model,
            candidate_labels: labels.into(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn candidate_labels(&self) -> &[String] {
        &self.candidate_labels
    }

    /// Score `text` against the candidate labels on the blocking pool
    pub async fn classify(&self, text: &str) -> Result<TopicScores> {
        let model = Arc::clone(&self.model);
        let labels = Arc::clone(&self.candidate_labels);
        let text = text.to_owned();

        let start = Instant::now();
        let scores = tokio::task::spawn_blocking(move || model.score(&text, &labels))
            .await
            .map_err(|e| Error::classifier(format!("topic model task failed: {}", e)))??;

        let elapsed = start.elapsed();
        metrics::histogram!("chatgate_classification_latency_us")
            .record(elapsed.as_micros() as f64);
        tracing::debug!(model = self.model.name(), latency = ?elapsed, "classified message");

        Ok(scores)
    }

    /// Classify `text` and compare its weighted average to the threshold
    pub async fn is_pertinent(
        &self,
        text: &str,
        reference_weights: &ReferenceWeights,
    ) -> Result<Pertinence> {
        let scores = self.classify(text).await?;
        Ok(self.evaluate(scores, reference_weights))
    }

    /// Apply the threshold to already computed scores
    pub fn evaluate(&self, scores: TopicScores, reference_weights: &ReferenceWeights) -> Pertinence {
        let weighted_average = weighted_average(&scores, reference_weights);
        Pertinence {
            passed: weighted_average > self.threshold,
            scores,
            weighted_average,
        }
    }
}

impl std::fmt::Debug for RelevanceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelevanceGate")
            .field("model", &self.model.name())
            .field("candidate_labels", &self.candidate_labels)
            .field("threshold", &self.threshold)
            .finish()
    }
}
