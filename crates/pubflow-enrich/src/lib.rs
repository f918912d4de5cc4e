//! AI enrichment client for Pubflow.
//!
//! Sends `(title, body)` to a chat-completion endpoint and parses the
//! model's JSON reply into a summary, 3–5 topic tags, and a structured
//! analysis block. Token usage is reported on every outcome — including
//! quality failures — because the tokens were consumed either way and the
//! budget gate must account for them.

mod client;
mod error;

pub use client::{EnrichClient, EnrichResult, Enrichment};
pub use error::EnrichError;
