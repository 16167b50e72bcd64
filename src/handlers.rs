use crate::membership::{MemberStatus, MembershipChange, on_bot_status_change};
use crate::{Data, EVENT_TARGET};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{
    self as serenity, Context, EventHandler, Guild, GuildId, GuildMemberUpdateEvent, Member,
    Ready, Timestamp, UnavailableGuild,
};
use tracing::{error, info, warn};

pub struct Handler {
    pub data: Data,
}

/// Status after the bot was dropped from a guild; outages are not removals
#[must_use]
pub fn removal_status(unavailable: bool) -> Option<MemberStatus> {
    (!unavailable).then_some(MemberStatus::Kicked)
}

fn timed_out(until: Option<Timestamp>, now: DateTime<Utc>) -> bool {
    until.is_some_and(|until| until.unix_timestamp() > now.timestamp())
}

/// Status of the bot after an update to its own member entry.
///
/// `None` unless a timeout starts with this update.
#[must_use]
pub fn timeout_status(
    previous: Option<Timestamp>,
    current: Option<Timestamp>,
    now: DateTime<Utc>,
) -> Option<MemberStatus> {
    (timed_out(current, now) && !timed_out(previous, now)).then_some(MemberStatus::Restricted)
}

impl Handler {
    fn is_group(&self, guild_id: GuildId) -> bool {
        guild_id.get() == self.data.config.group_id
    }

    async fn report_status(&self, guild_id: GuildId, status: MemberStatus) {
        let change = MembershipChange {
            group_id: guild_id.get(),
            status,
        };
        let data = &self.data;
        if let Some(report) = on_bot_status_change(
            change,
            data.config.group_id,
            &data.notifier,
            &data.translator,
            &data.config.default_lang,
        )
        .await
        {
            info!(
                target: EVENT_TARGET,
                delivered = report.delivered,
                failed = report.failed,
                "Admins alerted about bot status"
            );
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");

        let group = GuildId::new(self.data.config.group_id);
        if !ready.guilds.iter().any(|g| g.id == group) {
            warn!(
                target: EVENT_TARGET,
                group_id = group.get(),
                "Bot is not a member of the configured group"
            );
        }
    }

    async fn guild_member_addition(&self, _ctx: Context, new_member: Member) {
        if !self.is_group(new_member.guild_id) || new_member.user.bot {
            return;
        }

        let user_id = new_member.user.id.get();
        match self.data.store.record_join(user_id, Utc::now()).await {
            Ok(()) => info!(target: EVENT_TARGET, user_id, event = "join", "Member joined the group"),
            Err(err) => error!(
                target: EVENT_TARGET,
                user_id,
                error = %err,
                "Failed to record member join"
            ),
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if !self.is_group(incomplete.id) {
            return;
        }
        match removal_status(incomplete.unavailable) {
            Some(status) => self.report_status(incomplete.id, status).await,
            None => warn!(
                target: EVENT_TARGET,
                group_id = incomplete.id.get(),
                "Group is temporarily unavailable"
            ),
        }
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        if !self.is_group(event.guild_id) || event.user.id != ctx.cache.current_user().id {
            return;
        }

        let previous = old_if_available.and_then(|m| m.communication_disabled_until);
        if let Some(status) = timeout_status(previous, event.communication_disabled_until, Utc::now()) {
            self.report_status(event.guild_id, status).await;
        }
    }
}
