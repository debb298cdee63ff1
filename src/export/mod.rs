//! Export of batch results: CSV, JSON, and an MBOX of representatives.

pub mod csv;
pub mod json;
pub mod mbox;
