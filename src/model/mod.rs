//! Core data model: raw messages, classification results, flight records, and duplicate groups.

pub mod address;
pub mod classification;
pub mod flight;
pub mod group;
pub mod message;
