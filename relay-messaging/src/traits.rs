use crate::client::{OutgoingMessage, Profile, PushStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Outbound messaging operations the dispatcher depends on.
///
/// Each operation keeps its own failure convention: `get_profile` maps a
/// rejected lookup to `None`, `reply_message` fails hard, `push_message`
/// reports a two-valued status.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    async fn reply_message(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<()>;

    async fn push_message(&self, user_id: &str, messages: &[OutgoingMessage])
    -> Result<PushStatus>;
}
