//! `flightmail`: find airline flight confirmations in a mailbox, extract
//! their flight data, and group messages that describe the same booking.
//!
//! The core is three side-effect-free components: the [`classifier`], the
//! multi-strategy [`parser`] and the batch-level [`grouper`]. [`ingest`]
//! feeds them from MBOX/EML files and [`export`] writes their results.

pub mod classifier;
pub mod config;
pub mod error;
pub mod export;
pub mod grouper;
pub mod html;
pub mod ingest;
pub mod model;
pub mod parser;
pub mod pipeline;
