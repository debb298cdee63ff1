//! Multi-strategy flight data extraction.
//!
//! Strategies run in priority order (structured markup, table layout, text
//! heuristic). The first one that yields a non-empty record wins. A strategy
//! error is logged and treated as "no data".

pub mod dates;
pub mod markup;
pub mod table;
pub mod text;

use tracing::debug;

use crate::config::ParserConfig;
use crate::error::Result;
use crate::html;
use crate::model::flight::{FlightRecord, Strategy};
use crate::model::message::RawMessage;

/// Extracts a [`FlightRecord`] from a message.
///
/// Stateless apart from its settings; safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct FlightParser {
    merge_partial_records: bool,
}

impl FlightParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            merge_partial_records: config.merge_partial_records,
        }
    }

    /// Best-effort record for `message`, or `None` when every strategy missed.
    ///
    /// The record is normalized and tagged with the winning strategy. With
    /// partial-record merging on, later strategies fill the winner's empty
    /// fields and are listed in `supplemented_by`.
    pub fn parse(&self, message: &RawMessage) -> Option<FlightRecord> {
        let mut winner: Option<FlightRecord> = None;

        for strategy in Strategy::ALL {
            if winner.is_some() && !self.merge_partial_records {
                break;
            }
            let record = match self.run_strategy(strategy, message) {
                Ok(Some(record)) => record.normalized(),
                Ok(None) => {
                    debug!(id = %message.id, %strategy, "No flight data");
                    continue;
                }
                Err(e) => {
                    debug!(id = %message.id, %strategy, error = %e, "Strategy failed");
                    continue;
                }
            };
            if record.is_empty() {
                debug!(id = %message.id, %strategy, "Only unusable values extracted");
                continue;
            }

            match winner.as_mut() {
                None => {
                    debug!(id = %message.id, %strategy, "Extracted flight record");
                    winner = Some(record);
                }
                Some(primary) => {
                    if primary.fill_missing(&record) {
                        debug!(id = %message.id, %strategy, "Supplemented flight record");
                    }
                }
            }
        }

        winner
    }

    /// Run one strategy on its own.
    pub fn run_strategy(
        &self,
        strategy: Strategy,
        message: &RawMessage,
    ) -> Result<Option<FlightRecord>> {
        match strategy {
            Strategy::StructuredMarkup => match message.html() {
                Some(body) => markup::extract(body),
                None => Ok(None),
            },
            Strategy::TableLayout => match message.html() {
                Some(body) => table::extract(body),
                None => Ok(None),
            },
            Strategy::TextHeuristic => Ok(text::extract(&flattened_text(message))),
        }
    }
}

/// Flattened HTML followed by the plain-text body.
pub fn flattened_text(message: &RawMessage) -> String {
    let mut out = String::new();
    if let Some(body) = message.html() {
        out.push_str(&html::html_to_text(body));
    }
    if let Some(body) = message.text() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(body);
    }
    out
}
