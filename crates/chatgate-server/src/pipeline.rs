//! Guard stages shared read-only by every session

use chatgate_core::Result;
use chatgate_guard::{KeywordTopicModel, ReferenceWeights, RelevanceGate, ValidatorChain};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::query::QueryBuilder;

/// Everything a session needs to judge a message and build its query
#[derive(Debug)]
pub struct RelayPipeline {
    pub validator: ValidatorChain,
    pub gate: RelevanceGate,
    pub reference_weights: ReferenceWeights,
    pub query_builder: QueryBuilder,
    pub off_topic_notice: String,
}

impl RelayPipeline {
    /// Build the pipeline with the built-in keyword topic model
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let validation = &config.validation;
        let relevance = &config.relevance;

        let validator = ValidatorChain::standard(validation.max_length, &validation.regex_pattern)?;

        let labels: Vec<&str> = relevance.candidate_labels.keys().map(String::as_str).collect();
        let model = KeywordTopicModel::new(labels.iter().copied(), &relevance.topic_keywords)?;
        info!(
            rules = ?validator.rule_names(),
            labels = ?labels,
            keywords = model.keyword_count(),
            threshold = relevance.threshold,
            "Relay pipeline ready"
        );

        let gate = RelevanceGate::new(Arc::new(model), labels, relevance.threshold);

        Ok(Self {
            validator,
            gate,
            reference_weights: relevance.reference_weights(),
            query_builder: QueryBuilder::new(config.upstream.system_prompt.clone()),
            off_topic_notice: relevance.off_topic_notice.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_pipeline_judges_fashion_messages() {
        let pipeline = RelayPipeline::from_config(&AppConfig::default()).unwrap();

        assert!(pipeline.validator.validate("Tell me about red t-shirts").passed);
        assert!(!pipeline.validator.validate("<script>alert(1)</script>").passed);

        let on_topic = pipeline
            .gate
            .is_pertinent("What jacket goes with black jeans?", &pipeline.reference_weights)
            .await
            .unwrap();
        assert!(on_topic.passed);

        let off_topic = pipeline
            .gate
            .is_pertinent("Who won the football match?", &pipeline.reference_weights)
            .await
            .unwrap();
        assert!(!off_topic.passed);
    }

    #[tokio::test]
    async fn test_default_keywords_ignore_words_that_merely_start_with_one() {
        let pipeline = RelayPipeline::from_config(&AppConfig::default()).unwrap();

        for text in [
            "I hate football",
            "How do I bootstrap a Rust project?",
            "Is this algorithm suitable for sorting?",
            "Best fitness routine for runners",
        ] {
            let result = pipeline
                .gate
                .is_pertinent(text, &pipeline.reference_weights)
                .await
                .unwrap();
            assert!(!result.passed, "{} should be off topic", text);
        }

        let plural = pipeline
            .gate
            .is_pertinent("Which accessories suit tailored suits?", &pipeline.reference_weights)
            .await
            .unwrap();
        assert!(plural.passed);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut config = AppConfig::default();
        config.validation.regex_pattern = "[".to_string();
        assert!(RelayPipeline::from_config(&config).is_err());
    }
}
