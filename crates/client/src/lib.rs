//! REST client for the social-aid API.
//!
//! Provides environment-driven configuration, the [`pagination::PageSource`]
//! seam with a page-walking collector, and typed wrappers for the list,
//! write, upload, and statistics endpoints.

pub mod api;
pub mod config;
pub mod pagination;
