//! # Mentor Common Library
//!
//! Shared code for the teaching-session evaluation service:
//! - Error type used across crates
//! - Bootstrap configuration and root folder resolution
//! - Pipeline event bus (`MentorEvent`)
//! - SSE forwarding of pipeline events

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
