//! Webhook event model and messaging-backend client for ChatRelay.
//!
//! This crate is pure I/O: it decodes the platform's webhook envelope into
//! typed events and wraps the outbound messaging API (profile lookup, reply,
//! push) behind the `MessagingApi` trait.

mod client;
mod error;
mod events;
mod traits;

pub use client::{LineMessagingClient, OutgoingMessage, Profile, PushStatus};
pub use error::{MessagingError, Result};
pub use events::{
    EventSource, EventType, MessageContent, UnsendPayload, WebhookEnvelope, WebhookEvent,
};
pub use traits::MessagingApi;
