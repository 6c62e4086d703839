//! Background consumer of the webhook queue.
//!
//! Workers pull one envelope at a time and run it to completion; no failure
//! escapes the worker loop. Processing is at-most-once: a dequeued envelope
//! that fails is logged and dropped, never retried.

use crate::followers::FollowerStore;
use anyhow::{Result, anyhow};
use chrono::Utc;
use relay_genai::ReplyGenerator;
use relay_messaging::{EventType, MessagingApi, OutgoingMessage, WebhookEnvelope, WebhookEvent};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SUPPORT_PROMPT_PREFIX: &str = "You are an automated customer support assistant. \
Do not volunteer who or what you are; if asked, answer exactly \"automated support assistant\". \
If the question is too sensitive to answer, reply \"I don't know enough about this question!\". \
Answer in the language the user writes in. The user's question follows: ";

fn build_support_prompt(text: &str) -> String {
    format!("{SUPPORT_PROMPT_PREFIX}{text}")
}

pub struct Dispatcher {
    messaging: Arc<dyn MessagingApi>,
    genai: Arc<dyn ReplyGenerator>,
    followers: Arc<dyn FollowerStore>,
    rx: Arc<Mutex<mpsc::Receiver<WebhookEnvelope>>>,
}

impl Dispatcher {
    pub fn new(
        messaging: Arc<dyn MessagingApi>,
        genai: Arc<dyn ReplyGenerator>,
        followers: Arc<dyn FollowerStore>,
        rx: mpsc::Receiver<WebhookEnvelope>,
    ) -> Self {
        Self {
            messaging,
            genai,
            followers,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn start(
        self: Arc<Self>,
        workers: usize,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|worker| {
                let dispatcher = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { dispatcher.run_loop(worker, shutdown).await })
            })
            .collect()
    }

    #[tracing::instrument(level = "info", skip(self, shutdown))]
    async fn run_loop(&self, worker: usize, shutdown: CancellationToken) {
        loop {
            let envelope = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(worker, "dispatch worker stopping");
                    return;
                }
                envelope = self.next_envelope() => envelope,
            };
            let Some(envelope) = envelope else {
                tracing::debug!(worker, "event queue closed; dispatch worker exiting");
                return;
            };

            if let Err(e) = self.handle_envelope(envelope).await {
                tracing::warn!(worker, error = %e, "envelope processing failed; dropping");
            }
        }
    }

    async fn next_envelope(&self) -> Option<WebhookEnvelope> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Dispatches on `events[0]` only; trailing events in a multi-event
    /// envelope are dropped, matching the platform integration's contract.
    async fn handle_envelope(&self, envelope: WebhookEnvelope) -> Result<()> {
        let Some(event) = envelope.events.first() else {
            return Err(anyhow!("envelope dequeued with no events"));
        };

        match event.event_type {
            EventType::Message => self.handle_message(event).await,
            EventType::Follow => self.handle_follow(event).await,
            EventType::Unfollow => self.handle_unfollow(event).await,
            other => {
                tracing::debug!(event_type = ?other, "event type not dispatched");
                Ok(())
            }
        }
    }

    async fn handle_message(&self, event: &WebhookEvent) -> Result<()> {
        let reply_token = event
            .reply_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("message event without reply token"))?;
        let text = event
            .message
            .as_ref()
            .and_then(|m| m.text.as_deref())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("message event without text"))?;

        let prompt = build_support_prompt(text);
        // An empty or malformed generation is an error here, so no empty
        // reply is ever sent.
        let reply = self.genai.generate_reply(&prompt).await?;
        self.messaging
            .reply_message(reply_token, &[OutgoingMessage::text(reply)])
            .await?;
        Ok(())
    }

    async fn handle_follow(&self, event: &WebhookEvent) -> Result<()> {
        let user_id = event_user_id(event)?;
        let profile = self
            .messaging
            .get_profile(user_id)
            .await?
            .ok_or_else(|| anyhow!("no profile available for followed user {user_id}"))?;
        self.followers
            .upsert_follow(user_id, &profile, Utc::now())
            .await
    }

    async fn handle_unfollow(&self, event: &WebhookEvent) -> Result<()> {
        let user_id = event_user_id(event)?;
        self.followers.mark_unfollowed(user_id, Utc::now()).await
    }
}

fn event_user_id(event: &WebhookEvent) -> Result<&str> {
    event
        .source
        .as_ref()
        .and_then(|source| source.user_id.as_deref())
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| anyhow!("event source has no user id"))
}
