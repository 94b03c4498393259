//! chatgate Guard
//!
//! The two checks every inbound message passes before it reaches the model:
//!
//! - A [`ValidatorChain`] of cheap, synchronous [`ValidationRule`]s (length,
//!   allow-list pattern, escape safety) evaluated in order until one fails.
//! - A [`RelevanceGate`] that scores the message against candidate topics
//!   with an opaque, blocking [`TopicModel`] and compares the weighted
//!   average to a threshold.

pub mod chain;
pub mod model;
pub mod relevance;
pub mod rules;

pub use chain::{ValidatorChain, ValidatorChainBuilder};
pub use model::{KeywordTopicModel, TopicModel};
pub use relevance::{
    weighted_average, Pertinence, ReferenceWeights, RelevanceGate, TopicScores, DEFAULT_WEIGHT,
};
pub use rules::{
    EscapeRule, LengthRule, PatternRule, ValidationRule, Verdict, DEFAULT_ALLOWED_PATTERN,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::chain::{ValidatorChain, ValidatorChainBuilder};
    pub use crate::model::{KeywordTopicModel, TopicModel};
    pub use crate::relevance::{Pertinence, ReferenceWeights, RelevanceGate, TopicScores};
    pub use crate::rules::{ValidationRule, Verdict};
}
