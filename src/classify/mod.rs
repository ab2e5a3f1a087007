//! # Stream Classifier
//!
//! Assigns each decoded stream to a BIDS [`Modality`] by evaluating an ordered
//! [`RuleTable`] of `(predicate, modality)` pairs against the stream header.
//! The first matching rule wins. When another rule with the same priority
//! also matches but names a different modality, the stream is still
//! classified with the first match and flagged as ambiguous.
//!
//! A stream that matches no rule is [`Modality::Unsupported`]. That is a
//! classification outcome, not an error.
//!
//! ```rust
//! use xdf2bids::classify::{Classifier, Modality};
//! use xdf2bids::ingest::{Stream, StreamHeader};
//!
//! let classifier = Classifier::default();
//! let stream = Stream::numeric(1, StreamHeader::new("BioSemi", "EEG", 1, 512.0), vec![], vec![]);
//! assert_eq!(classifier.classify(&stream).modality, Modality::Eeg);
//! ```

mod modality;
mod rules;


pub use modality::Modality;
pub use rules::{default_rules, ClassificationRule, Matching, RuleTable, StreamPredicate};

use log::{debug, warn};

use crate::ingest::{Stream, StreamHeader};

/// A stream with its assigned modality.
#[derive(Debug, Clone)]
pub struct ClassifiedStream<'a> {
    /// The decoded input stream (never mutated)
    pub stream: &'a Stream,
    /// Assigned modality
    pub modality: Modality,
    /// Label of the winning rule, if any
    pub rule: Option<String>,
    /// Other modalities that matched with the same priority
    pub alternatives: Vec<Modality>,
}

impl<'a> ClassifiedStream<'a> {
    /// True when a same-priority rule disagreed with the winning rule.
    pub fn is_ambiguous(&self) -> bool {
        !self.alternatives.is_empty()
    }

    /// True when the stream is excluded from output.
    pub fn is_unsupported(&self) -> bool {
        self.modality == Modality::Unsupported
    }

    /// Stream id shorthand.
    pub fn id(&self) -> u32 {
        self.stream.id
    }

    /// Header shorthand.
    pub fn header(&self) -> &'a StreamHeader {
        &self.stream.header
    }

    /// Warning text for an ambiguous classification.
    pub fn ambiguity_warning(&self) -> Option<String> {
        if !self.is_ambiguous() {
            return None;
        }
        let others: Vec<&str> = self.alternatives.iter().map(|m| m.as_str()).collect();
        Some(format!(
            "ambiguous classification: chose {} (rule '{}'), also matched {}",
            self.modality,
            self.rule.as_deref().unwrap_or("?"),
            others.join(", ")
        ))
    }
}

/// Pure classifier over a rule table.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    table: RuleTable,
}

impl Classifier {
    /// Create a classifier over the given table.
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    /// The rule table in evaluation order.
    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Classify a single stream.
    pub fn classify<'a>(&self, stream: &'a Stream) -> ClassifiedStream<'a> {
        let header = &stream.header;
        let mut matched = self
            .table
            .rules()
            .iter()
            .filter(|rule| rule.predicate.matches(header));

        let Some(winner) = matched.next() else {
            debug!(
                "Stream {} ('{}', type '{}') matched no rule",
                stream.id, header.name, header.stream_type
            );
            return ClassifiedStream {
                stream,
                modality: Modality::Unsupported,
                rule: None,
                alternatives: Vec::new(),
            };
        };

        let mut alternatives: Vec<Modality> = Vec::new();
        for rule in matched {
            if rule.priority != winner.priority {
                break;
            }
            if rule.modality != winner.modality && !alternatives.contains(&rule.modality) {
                alternatives.push(rule.modality);
            }
        }

        let classified = ClassifiedStream {
            stream,
            modality: winner.modality,
            rule: Some(winner.display_label()),
            alternatives,
        };

        if let Some(warning) = classified.ambiguity_warning() {
            warn!("Stream {} ('{}'): {}", stream.id, header.name, warning);
        } else {
            debug!(
                "Stream {} ('{}') classified as {}",
                stream.id, header.name, classified.modality
            );
        }

        classified
    }

    /// Classify every stream, preserving input order.
    pub fn classify_all<'a>(&self, streams: &'a [Stream]) -> Vec<ClassifiedStream<'a>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            streams.par_iter().map(|s| self.classify(s)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            streams.iter().map(|s| self.classify(s)).collect()
        }
    }
}
