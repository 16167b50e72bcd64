use crate::enforcement::force_kick_below_threshold;
use crate::i18n::MessageKey;
use crate::status::{StatusSummary, format_status};
use crate::{COMMAND_TARGET, Context, Error};
use chrono::Utc;
use poise::{command, serenity_prelude as serenity};
use tracing::info;

/// Reply with the admin-only notice unless the author is an administrator
async fn ensure_admin(ctx: Context<'_>) -> Result<bool, Error> {
    let data = ctx.data();
    if data.notifier.is_admin(ctx.author().id.get()).await {
        return Ok(true);
    }
    let text = data.text(MessageKey::AdminOnly, &[]);
    ctx.say(text).await?;
    Ok(false)
}

/// Remove every member whose balance is below the threshold, regardless of warnings
#[command(prefix_command, slash_command, dm_only)]
pub async fn force_kick(ctx: Context<'_>) -> Result<(), Error> {
    if !ensure_admin(ctx).await? {
        return Ok(());
    }

    let data = ctx.data();
    let text = data.text(MessageKey::ForceKickStarted, &[]);
    ctx.say(text).await?;

    let report = force_kick_below_threshold(data.store.as_ref(), &data.policy, Utc::now()).await?;
    info!(
        target: COMMAND_TARGET,
        user_id = ctx.author().id.get(),
        candidates = report.candidates,
        kicked = report.kicked,
        failed = report.failed,
        "Force kick finished"
    );

    let text = data.text(MessageKey::ForceKickCompleted, &[&report.kicked]);
    ctx.say(text).await?;
    Ok(())
}

/// Show the threshold, member counts and the last sync cycle
#[command(prefix_command, slash_command, dm_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    if !ensure_admin(ctx).await? {
        return Ok(());
    }

    let data = ctx.data();
    let members = data.store.joined_users().await?;
    let threshold = data.store.threshold().await?;
    let now = Utc::now();
    let summary = StatusSummary::from_members(&members, threshold, now);
    let last_cycle = data.last_cycle.read().await.clone();

    ctx.say(format_status(&summary, last_cycle.as_ref(), now)).await?;
    Ok(())
}

/// Show the balance threshold, or set a new one
#[command(prefix_command, slash_command, dm_only)]
pub async fn threshold(
    ctx: Context<'_>,
    #[description = "New minimum balance"] value: Option<f64>,
) -> Result<(), Error> {
    if !ensure_admin(ctx).await? {
        return Ok(());
    }

    let data = ctx.data();
    let Some(value) = value else {
        let current = data.store.threshold().await?;
        ctx.say(format!("**Threshold**: {current}")).await?;
        return Ok(());
    };

    data.store.set_threshold(value).await?;
    info!(
        target: COMMAND_TARGET,
        user_id = ctx.author().id.get(),
        threshold = value,
        "Threshold changed"
    );
    let text = data.text(MessageKey::ThresholdUpdated, &[&value]);
    ctx.say(text).await?;
    Ok(())
}

/// Grant administrator rights to another user
#[command(prefix_command, slash_command, dm_only)]
pub async fn add_admin(
    ctx: Context<'_>,
    #[description = "User to promote"] user: serenity::User,
) -> Result<(), Error> {
    if !ensure_admin(ctx).await? {
        return Ok(());
    }

    let data = ctx.data();
    let user_id = user.id.get();
    data.store.add_admin(user_id).await?;
    info!(
        target: COMMAND_TARGET,
        user_id = ctx.author().id.get(),
        new_admin = user_id,
        "Administrator added"
    );
    let text = data.text(MessageKey::AdminAdded, &[&user_id]);
    ctx.say(text).await?;
    Ok(())
}

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![force_kick(), status(), threshold(), add_admin()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_kick_command_definition() {
        let cmd = force_kick();
        assert_eq!(cmd.name, "force_kick");
        assert!(cmd.dm_only);
        assert!(
            cmd.description
                .unwrap_or_default()
                .contains("regardless of warnings")
        );
    }

    #[test]
    fn test_threshold_takes_optional_value() {
        let cmd = threshold();
        assert_eq!(cmd.parameters.len(), 1);
        assert_eq!(cmd.parameters[0].name, "value");
        assert!(!cmd.parameters[0].required);
    }

    #[test]
    fn test_all_commands_are_dm_only_slash_commands() {
        let commands = all();
        let names: Vec<&str> = commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["force_kick", "status", "threshold", "add_admin"]);
        for cmd in &commands {
            assert!(cmd.dm_only, "{} should be dm_only", cmd.name);
            assert!(cmd.create_as_slash_command().is_some());
        }
    }

    // The actions box each command future as `Send`; building them fails to
    // compile if a reply holds borrowed message arguments across an await.
    #[test]
    fn test_reply_commands_have_send_actions() {
        for cmd in [force_kick(), threshold(), add_admin()] {
            assert!(cmd.slash_action.is_some(), "{} has no slash action", cmd.name);
            assert!(cmd.prefix_action.is_some(), "{} has no prefix action", cmd.name);
        }
    }
}
