//! Herald Slack - Slack integration for Herald
//!
//! Implements the core's `NotificationGateway` and `IdentityResolver` over the
//! Slack Web API, renders Block Kit messages and forms, parses interaction
//! payloads and Events API callbacks, and verifies request signatures.

pub mod blocks;
mod client;
mod error;
pub mod events;
pub mod interaction;
pub mod signature;

pub use client::SlackClient;
pub use error::{Error, Result};
pub use events::{parse_event, SlackEvent};
pub use interaction::{parse_interaction, validation_response, InteractionEvent, SlashCommand};
pub use signature::{verify_signature, SignatureError};
