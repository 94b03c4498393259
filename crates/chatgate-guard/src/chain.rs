//! Chain-of-responsibility validator
//!
//! Rules run strictly in registration order and the first failure wins.
//! Cheap rules belong first: length before pattern before escaping.

use crate::rules::{EscapeRule, LengthRule, PatternRule, ValidationRule, Verdict};
use chatgate_core::Result;

/// An immutable, ordered list of validation rules
#[derive(Debug)]
pub struct ValidatorChain {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ValidatorChain {
    /// Start assembling a chain
    pub fn builder() -> ValidatorChainBuilder {
        ValidatorChainBuilder::new()
    }

    /// The standard chain: length, then allow-list pattern, then escaping
    pub fn standard(max_length: usize, allowed_pattern: &str) -> Result<Self> {
        Ok(Self::builder()
            .length(max_length)
            .pattern(allowed_pattern)?
            .escape()
            .build())
    }

    /// Run every rule in order, stopping at the first failure
    pub fn validate(&self, text: &str) -> Verdict {
        for rule in &self.rules {
            let verdict = rule.validate(text);
            if !verdict.passed {
                tracing::debug!(rule = rule.name(), reason = %verdict.reason, "validation failed");
                return verdict;
            }
        }
        Verdict::pass()
    }

    /// Names of the rules in evaluation order
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Fluent builder for [`ValidatorChain`]
///
/// `build` consumes the builder, so no rule can be added to a chain that is
/// already in use.
#[derive(Debug, Default)]
pub struct ValidatorChainBuilder {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ValidatorChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a length rule
    pub fn length(self, max_length: usize) -> Self {
        self.rule(LengthRule::new(max_length))
    }

    /// Append an allow-list pattern rule; fails if the pattern does not compile
    pub fn pattern(self, allowed_pattern: &str) -> Result<Self> {
        Ok(self.rule(PatternRule::new(allowed_pattern)?))
    }

    /// Append the escape-safety rule
    pub fn escape(self) -> Self {
        self.rule(EscapeRule::new())
    }

    /// Append any custom rule
    pub fn rule(mut self, rule: impl ValidationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Freeze the chain
    pub fn build(self) -> ValidatorChain {
        ValidatorChain { rules: self.rules }
    }
}
