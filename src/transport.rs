//! Chat transport
//!
//! The engine only needs two things from the chat platform: sending a direct
//! message and removing a member from the group. `SerenityTransport` provides
//! both for a single Discord guild.

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use poise::serenity_prelude::{self as serenity, CreateMessage, GuildId, Http, UserId};
use std::sync::Arc;
use tracing::info;

/// Discord JSON error code for "Unknown Member"
const UNKNOWN_MEMBER: isize = 10007;

/// Reason recorded in the guild audit log for removals
const REMOVAL_REASON: &str = "Balance below the group threshold";

/// Outbound operations against the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupTransport: Send + Sync {
    /// Send a direct message to a user
    async fn send_message(&self, recipient: u64, text: &str) -> TransportResult<()>;

    /// Remove a member from the group.
    ///
    /// Returns `Ok(false)` when the member could not be removed because they
    /// are no longer in the group.
    async fn remove_member(&self, user_id: u64) -> TransportResult<bool>;
}

/// Transport backed by the Discord HTTP API
pub struct SerenityTransport {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl SerenityTransport {
    #[must_use]
    pub fn new(http: Arc<Http>, guild_id: u64) -> Self {
        Self {
            http,
            guild_id: GuildId::new(guild_id),
        }
    }
}

fn is_unknown_member(error: &serenity::Error) -> bool {
    matches!(
        error,
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response))
            if response.error.code == UNKNOWN_MEMBER
    )
}

#[async_trait]
impl GroupTransport for SerenityTransport {
    async fn send_message(&self, recipient: u64, text: &str) -> TransportResult<()> {
        if recipient == 0 {
            return Err(TransportError::Other("recipient id 0 is not a user".to_string()));
        }

        let channel = UserId::new(recipient)
            .create_dm_channel(self.http.as_ref())
            .await?;
        channel
            .send_message(self.http.as_ref(), CreateMessage::new().content(text))
            .await?;
        Ok(())
    }

    async fn remove_member(&self, user_id: u64) -> TransportResult<bool> {
        if user_id == 0 {
            return Ok(false);
        }

        match self
            .guild_id
            .kick_with_reason(self.http.as_ref(), UserId::new(user_id), REMOVAL_REASON)
            .await
        {
            Ok(()) => {
                info!("Removed user {user_id} from guild {}", self.guild_id);
                Ok(true)
            }
            Err(e) if is_unknown_member(&e) => {
                info!("User {user_id} is no longer in guild {}", self.guild_id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
