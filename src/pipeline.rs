//! Classify → parse → group over one batch of messages.

use std::num::NonZeroUsize;

use serde::Serialize;
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::Result;
use crate::grouper::{GroupInput, Grouper};
use crate::model::classification::ClassificationResult;
use crate::model::flight::FlightRecord;
use crate::model::group::DuplicateGroup;
use crate::model::message::RawMessage;
use crate::parser::FlightParser;

/// What the core decided about one message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageOutcome {
    pub message_id: String,
    pub classification: ClassificationResult,
    /// Extracted record; always `None` for rejected messages.
    pub record: Option<FlightRecord>,
}

impl MessageOutcome {
    pub fn is_accepted(&self) -> bool {
        self.classification.is_confirmation
    }
}

/// Counters for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub accepted: usize,
    pub parsed: usize,
    /// Accepted messages no strategy could parse.
    pub unparsed: usize,
    pub groups: usize,
    /// Accepted messages that are not their group's representative.
    pub duplicates: usize,
}

/// Result of [`Pipeline::run`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// One outcome per input message, in input order.
    pub outcomes: Vec<MessageOutcome>,
    /// Groups over accepted messages only.
    pub groups: Vec<DuplicateGroup>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn outcome(&self, message_id: &str) -> Option<&MessageOutcome> {
        self.outcomes.iter().find(|o| o.message_id == message_id)
    }

    /// Group containing `message_id`.
    pub fn group_of(&self, message_id: &str) -> Option<&DuplicateGroup> {
        self.groups.iter().find(|g| g.contains(message_id))
    }

    /// Ids of the messages to forward downstream, one per group.
    pub fn representatives(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.representative.as_str())
    }
}

/// The three core components wired together.
pub struct Pipeline {
    classifier: Classifier,
    parser: FlightParser,
    grouper: Grouper,
    workers: usize,
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            classifier: Classifier::new(&config.classifier)?,
            parser: FlightParser::new(&config.parser),
            grouper: Grouper::new(&config.grouping),
            workers: config.general.workers,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn parser(&self) -> &FlightParser {
        &self.parser
    }

    pub fn grouper(&self) -> &Grouper {
        &self.grouper
    }

    /// Classify and parse one message; rejected messages are not parsed.
    pub fn process(&self, message: &RawMessage) -> MessageOutcome {
        let classification = self.classifier.classify(message);
        let record = if classification.is_confirmation {
            self.parser.parse(message)
        } else {
            None
        };
        MessageOutcome {
            message_id: message.id.clone(),
            classification,
            record,
        }
    }

    /// Run the whole batch. Classification and parsing fan out over worker
    /// threads; grouping starts once every message is done.
    pub fn run(&self, messages: &[RawMessage]) -> BatchReport {
        let outcomes = self.process_all(messages);

        let inputs: Vec<GroupInput> = messages
            .iter()
            .zip(&outcomes)
            .filter(|(_, outcome)| outcome.is_accepted())
            .map(|(message, outcome)| GroupInput::from_message(message, outcome.record.clone()))
            .collect();
        let groups = self.grouper.group(&inputs);

        let accepted = inputs.len();
        let parsed = outcomes.iter().filter(|o| o.record.is_some()).count();
        let stats = BatchStats {
            total: messages.len(),
            accepted,
            parsed,
            unparsed: accepted - parsed,
            groups: groups.len(),
            duplicates: accepted - groups.len(),
        };
        info!(
            total = stats.total,
            accepted = stats.accepted,
            parsed = stats.parsed,
            groups = stats.groups,
            duplicates = stats.duplicates,
            "Batch complete"
        );

        BatchReport {
            outcomes,
            groups,
            stats,
        }
    }

    fn process_all(&self, messages: &[RawMessage]) -> Vec<MessageOutcome> {
        let workers = self.worker_count().min(messages.len()).max(1);
        if workers == 1 {
            return messages.iter().map(|m| self.process(m)).collect();
        }

        let chunk_size = messages.len().div_ceil(workers);
        debug!(workers, chunk_size, "Processing batch in parallel");
        std::thread::scope(|scope| {
            let handles: Vec<_> = messages
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || chunk.iter().map(|m| self.process(m)).collect::<Vec<_>>()))
                .collect();
            // Chunks are joined in spawn order, which keeps input order.
            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(outcomes) => outcomes,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        }
    }
}
