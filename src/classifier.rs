//! Flight confirmation classifier.
//!
//! Four independent signals add fixed amounts to a score; a message is a
//! confirmation when the score reaches the configured threshold.
//!
//! | Signal                        | Points |
//! |-------------------------------|--------|
//! | Confirmed reservation markup  | 50     |
//! | Airline / agency sender       | 20     |
//! | Confirmation subject          | 20     |
//! | ≥ 3 of 4 content markers      | 10     |

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::ClassifierConfig;
use crate::error::{FlightError, Result};
use crate::html;
use crate::model::address::EmailAddress;
use crate::model::classification::{ClassificationResult, Signal};
use crate::model::message::RawMessage;
use crate::parser::markup;

pub const SCHEMA_POINTS: u32 = 50;
pub const DOMAIN_POINTS: u32 = 20;
pub const SUBJECT_POINTS: u32 = 20;
pub const CONTENT_POINTS: u32 = 10;

/// Content markers needed for the content signal.
const MIN_CONTENT_MARKERS: usize = 3;

const CONFIRMATION_PATTERNS: &[&str] = &[
    r"(?i)(flight|booking|reservation).*confirm(ed|ation)",
    r"(?i)confirm.*flight",
    r"(?i)itinerary.*confirm",
    r"(?i)booking.*confirm",
];

const EXCLUSION_PATTERNS: &[&str] = &[
    r"(?i)cancel",
    r"(?i)check[\s-]*in",
    r"(?i)(change|update|modif)",
    r"(?i)reminder",
    r"(?i)expired",
];

static REFERENCE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{6}\b").expect("valid marker regex"));

static FLIGHT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Z0-9]\s?\d{1,4}\b").expect("valid marker regex"));

static AIRPORT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{3}\b").expect("valid marker regex"));

static KEYWORD_CODE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:confirmation|booking|reservation|pnr).{0,20}?\b[A-Z0-9]{5,6}\b")
        .expect("valid marker regex")
});

/// Which content markers a text carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentMarkers {
    pub reference_token: bool,
    pub flight_token: bool,
    pub airport_codes: bool,
    pub keyword_code: bool,
}

impl ContentMarkers {
    pub fn scan(text: &str) -> Self {
        Self {
            reference_token: REFERENCE_MARKER.is_match(text),
            flight_token: FLIGHT_MARKER.is_match(text),
            airport_codes: AIRPORT_MARKER.find_iter(text).nth(1).is_some(),
            keyword_code: KEYWORD_CODE_MARKER.is_match(text),
        }
    }

    pub fn count(&self) -> usize {
        [
            self.reference_token,
            self.flight_token,
            self.airport_codes,
            self.keyword_code,
        ]
        .into_iter()
        .filter(|m| *m)
        .count()
    }
}

/// Scores messages. Holds only compiled settings, so one instance can be
/// shared by every worker thread.
#[derive(Debug, Clone)]
pub struct Classifier {
    threshold: u32,
    airline_domains: Vec<String>,
    confirmation_patterns: Vec<Regex>,
    exclusion_patterns: Vec<Regex>,
}

impl Classifier {
    /// Build a classifier, compiling the built-in and extra subject patterns.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let airline_domains = config
            .airline_domains
            .iter()
            .map(|d| d.trim().trim_start_matches(['@', '.']).to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        let confirmation_patterns = CONFIRMATION_PATTERNS
            .iter()
            .copied()
            .chain(config.extra_confirmation_patterns.iter().map(String::as_str))
            .map(compile)
            .collect::<Result<Vec<_>>>()?;
        let exclusion_patterns = EXCLUSION_PATTERNS
            .iter()
            .copied()
            .chain(config.extra_exclusion_patterns.iter().map(String::as_str))
            .map(compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            threshold: config.threshold,
            airline_domains,
            confirmation_patterns,
            exclusion_patterns,
        })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Score `message` and decide whether it is a flight confirmation.
    ///
    /// Never fails: a signal that cannot be evaluated contributes nothing.
    /// A message with neither subject nor body is rejected as invalid input.
    pub fn classify(&self, message: &RawMessage) -> ClassificationResult {
        if message.is_blank() {
            debug!(id = %message.id, "Rejected message without subject or body");
            return ClassificationResult::invalid(&message.id);
        }

        let mut signals = Vec::new();

        let schema_score = if message.html().is_some_and(|h| self.has_confirmed_markup(h, &message.id)) {
            signals.push(Signal::StructuredMarkup);
            SCHEMA_POINTS
        } else {
            0
        };

        let domain_score = if self.is_airline_domain(&message.sender) {
            signals.push(Signal::AirlineDomain);
            DOMAIN_POINTS
        } else {
            0
        };

        let subject_score = if self.is_confirmation_subject(&message.subject) {
            signals.push(Signal::ConfirmationSubject);
            SUBJECT_POINTS
        } else {
            0
        };

        let content_score = if has_flight_markers(&content_text(message)) {
            signals.push(Signal::ContentMarkers);
            CONTENT_POINTS
        } else {
            0
        };

        let total_score = schema_score + domain_score + subject_score + content_score;
        let is_confirmation = total_score >= self.threshold;

        if is_confirmation {
            info!(
                id = %message.id,
                score = total_score,
                signals = ?signals,
                "Classified as flight confirmation"
            );
        } else {
            debug!(id = %message.id, score = total_score, "Not a flight confirmation");
        }

        ClassificationResult {
            message_id: message.id.clone(),
            schema_score,
            domain_score,
            subject_score,
            content_score,
            total_score,
            is_confirmation,
            signals,
            invalid_input: false,
        }
    }

    /// A confirmed (not cancelled) flight reservation is marked up in `html`.
    pub fn has_confirmed_markup(&self, html: &str, message_id: &str) -> bool {
        match markup::find_reservations(html) {
            Ok(reservations) => reservations.iter().any(markup::Reservation::confirms_booking),
            Err(e) => {
                debug!(id = message_id, error = %e, "Markup check failed");
                false
            }
        }
    }

    /// The sender's domain is a listed domain or a subdomain of one.
    pub fn is_airline_domain(&self, sender: &EmailAddress) -> bool {
        let Some(domain) = sender.domain() else {
            return false;
        };
        self.airline_domains.iter().any(|listed| {
            domain == *listed
                || domain
                    .strip_suffix(listed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// A confirmation pattern matches and no exclusion pattern does.
    pub fn is_confirmation_subject(&self, subject: &str) -> bool {
        self.confirmation_patterns.iter().any(|p| p.is_match(subject))
            && !self.exclusion_patterns.iter().any(|p| p.is_match(subject))
    }
}

/// At least three of the four content markers appear in `text`.
pub fn has_flight_markers(text: &str) -> bool {
    ContentMarkers::scan(text).count() >= MIN_CONTENT_MARKERS
}

/// Subject plus the plain-text body, or the flattened HTML when there is
/// no plain-text body.
fn content_text(message: &RawMessage) -> String {
    let body = match (message.text(), message.html()) {
        (Some(text), _) => text.to_string(),
        (None, Some(html_body)) => html::html_to_text(html_body),
        (None, None) => String::new(),
    };
    format!("{} {body}", message.subject)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| FlightError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIRMED_JSON_LD: &str = r#"<script type="application/ld+json">
{"@context":"http://schema.org","@type":"FlightReservation","reservationNumber":"ABCD12",
 "reservationStatus":"http://schema.org/ReservationConfirmed"}</script><p>Thanks</p>"#;

    fn classifier() -> Classifier {
        Classifier::new(&ClassifierConfig::default()).unwrap()
    }

    #[test]
    fn test_classification_is_deterministic() {
        let msg = RawMessage::new("a", "United <notifications@united.com>", "Your flight confirmation")
            .with_html(CONFIRMED_JSON_LD)
            .with_text("Confirmation ABCD12 UA123 SFO to JFK");
        let c = classifier();
        assert_eq!(c.classify(&msg), c.classify(&msg));
    }

    #[test]
    fn test_full_score() {
        let msg = RawMessage::new("a", "notifications@united.com", "Your flight confirmation")
            .with_html(CONFIRMED_JSON_LD)
            .with_text("Confirmation ABCD12 for UA123 SFO to JFK");
        let result = classifier().classify(&msg);
        assert_eq!(result.schema_score, 50);
        assert_eq!(result.domain_score, 20);
        assert_eq!(result.subject_score, 20);
        assert_eq!(result.content_score, 10);
        assert_eq!(result.total_score, 100);
        assert_eq!(
            result.signals,
            vec![
                Signal::StructuredMarkup,
                Signal::AirlineDomain,
                Signal::ConfirmationSubject,
                Signal::ContentMarkers
            ]
        );
    }

    #[test]
    fn test_forty_points_is_rejected() {
        // Airline domain + confirmation subject, nothing else.
        let msg = RawMessage::new("a", "noreply@delta.com", "Booking confirmed")
            .with_text("Thanks for choosing us.");
        let result = classifier().classify(&msg);
        assert_eq!(result.total_score, 40);
        assert!(!result.is_confirmation);
    }

    #[test]
    fn test_fifty_points_is_accepted() {
        let msg = RawMessage::new("a", "noreply@delta.com", "Booking confirmed")
            .with_text("Confirmation HX7Q2P: DL 405 ATL to LAX");
        let result = classifier().classify(&msg);
        assert_eq!(result.total_score, 50);
        assert!(result.is_confirmation);
    }

    #[test]
    fn test_markup_alone_is_sufficient() {
        let msg = RawMessage::new("a", "friend@example.org", "fwd").with_html(CONFIRMED_JSON_LD);
        let result = classifier().classify(&msg);
        assert_eq!(result.total_score, 50);
        assert!(result.is_confirmation);
        assert!(result.fired(Signal::StructuredMarkup));
    }

    #[test]
    fn test_cancelled_markup_scores_nothing() {
        let html = r#"<script type="application/ld+json">{"@type":"FlightReservation","reservationStatus":"http://schema.org/ReservationCancelled"}</script>"#;
        let msg = RawMessage::new("a", "friend@example.org", "fwd").with_html(html);
        assert_eq!(classifier().classify(&msg).schema_score, 0);
    }

    #[test]
    fn test_malformed_markup_degrades_to_zero() {
        let html = r#"<script type="application/ld+json">{"@type": "FlightRes</script>"#;
        let msg = RawMessage::new("a", "friend@example.org", "hello").with_html(html);
        let result = classifier().classify(&msg);
        assert_eq!(result.schema_score, 0);
        assert!(!result.invalid_input);
    }

    #[test]
    fn test_blank_message_is_invalid() {
        let msg = RawMessage::new("a", "noreply@united.com", "   ");
        let result = classifier().classify(&msg);
        assert!(result.invalid_input);
        assert!(!result.is_confirmation);
        assert_eq!(result.total_score, 0);
        assert!(result.signals.is_empty());
    }

    #[test]
    fn test_airline_domain_suffix_matching() {
        let c = classifier();
        assert!(c.is_airline_domain(&EmailAddress::parse("a@united.com")));
        assert!(c.is_airline_domain(&EmailAddress::parse("a@X.United.COM")));
        assert!(!c.is_airline_domain(&EmailAddress::parse("a@notunited.com")));
        assert!(!c.is_airline_domain(&EmailAddress::parse("united.com")));
        assert!(!c.is_airline_domain(&EmailAddress::parse("a@united.com.evil.org")));
    }

    #[test]
    fn test_subject_patterns_and_exclusions() {
        let c = classifier();
        assert!(c.is_confirmation_subject("Your flight reservation is confirmed"));
        assert!(c.is_confirmation_subject("Please confirm your flight"));
        assert!(c.is_confirmation_subject("Itinerary - confirmation"));
        assert!(!c.is_confirmation_subject("Flight confirmation: check-in now open"));
        assert!(!c.is_confirmation_subject("Booking confirmed - schedule change"));
        assert!(!c.is_confirmation_subject("Reminder: booking confirmation"));
        assert!(!c.is_confirmation_subject("Weekly newsletter"));
    }

    #[test]
    fn test_content_markers() {
        let markers = ContentMarkers::scan("Booking ref XK9P2Q flight B6 615 BOS to SFO");
        assert!(markers.reference_token);
        assert!(markers.flight_token);
        assert!(markers.airport_codes);
        assert!(markers.keyword_code);
        assert!(has_flight_markers("Booking ref XK9P2Q flight B6 615 BOS to SFO"));
        assert!(!has_flight_markers("Hello there, see you at 5"));
    }

    #[test]
    fn test_html_body_used_when_no_text() {
        let msg = RawMessage::new("a", "friend@example.org", "Trip")
            .with_html("<p>Confirmation: HX7Q2P</p><p>DL 405 ATL to LAX</p>");
        assert_eq!(classifier().classify(&msg).content_score, 10);
    }

    #[test]
    fn test_extra_patterns() {
        let config = ClassifierConfig {
            extra_confirmation_patterns: vec![r"(?i)bon voyage".into()],
            extra_exclusion_patterns: vec![r"(?i)survey".into()],
            ..ClassifierConfig::default()
        };
        let c = Classifier::new(&config).unwrap();
        assert!(c.is_confirmation_subject("Bon voyage!"));
        assert!(!c.is_confirmation_subject("Flight confirmed - quick survey"));
    }

    #[test]
    fn test_invalid_extra_pattern_fails_construction() {
        let config = ClassifierConfig {
            extra_confirmation_patterns: vec!["(unclosed".into()],
            ..ClassifierConfig::default()
        };
        assert!(matches!(
            Classifier::new(&config),
            Err(FlightError::InvalidPattern { .. })
        ));
    }
}
