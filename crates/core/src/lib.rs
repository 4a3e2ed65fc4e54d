//! Domain model and pure logic for the social-aid recipient dashboard.
//!
//! This crate has no I/O: record types as the aid API transmits them,
//! economic-status classification, coordinate pairing, filtering, and
//! detail panel shaping. The HTTP client and the sync layer build on it.

pub mod coordinates;
pub mod error;
pub mod filter;
pub mod format;
pub mod panel;
pub mod recipient;
pub mod statistics;
pub mod status;
pub mod types;
