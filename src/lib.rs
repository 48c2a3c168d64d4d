//! Candidate Evidence Library
//!
//! Parses candidate-card markdown reports, scores listing matches and audits
//! report links.

pub mod types;
pub mod config;
pub mod parser;
pub mod classify;
pub mod normalize;
pub mod matching;
pub mod sorter;
pub mod link_health;
pub mod storage;

pub use types::*;
