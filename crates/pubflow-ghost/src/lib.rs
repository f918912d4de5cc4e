//! Publishing-target client for Pubflow.
//!
//! Talks to a Ghost-style admin API: create and update posts keyed by the
//! target-assigned `publish_ref`, plus the unpublish and permanent-delete
//! calls the takedown workflow uses. Deleting or unpublishing a post the
//! target no longer has is treated as success — the desired end state
//! already holds.

mod client;
mod error;

pub use client::{GhostClient, PostDraft, PublishRef};
pub use error::GhostError;
