//! Classifier output.

use std::fmt;

/// One of the four classification signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signal {
    /// Confirmed flight reservation markup in the HTML body.
    StructuredMarkup,
    /// Sender belongs to a known airline or travel agency.
    AirlineDomain,
    /// Subject reads like a booking confirmation.
    ConfirmationSubject,
    /// Body carries enough reference/flight/airport tokens.
    ContentMarkers,
}

impl Signal {
    pub fn label(self) -> &'static str {
        match self {
            Self::StructuredMarkup => "structured-markup",
            Self::AirlineDomain => "airline-domain",
            Self::ConfirmationSubject => "confirmation-subject",
            Self::ContentMarkers => "content-markers",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Score breakdown and decision for one message.
///
/// A pure function of the message and the classifier settings: classifying
/// the same message twice yields an identical value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClassificationResult {
    pub message_id: String,
    /// Structured markup contribution (0 or 50).
    pub schema_score: u32,
    /// Sender domain contribution (0 or 20).
    pub domain_score: u32,
    /// Subject contribution (0 or 20).
    pub subject_score: u32,
    /// Content marker contribution (0 or 10).
    pub content_score: u32,
    pub total_score: u32,
    pub is_confirmation: bool,
    /// Signals that fired, in scoring order.
    pub signals: Vec<Signal>,
    /// The message had neither subject nor body and was rejected outright.
    pub invalid_input: bool,
}

impl ClassificationResult {
    /// Decisive rejection for a message missing its mandatory content.
    pub fn invalid(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            schema_score: 0,
            domain_score: 0,
            subject_score: 0,
            content_score: 0,
            total_score: 0,
            is_confirmation: false,
            signals: Vec::new(),
            invalid_input: true,
        }
    }

    pub fn fired(&self, signal: Signal) -> bool {
        self.signals.contains(&signal)
    }
}
