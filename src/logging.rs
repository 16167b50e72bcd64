use crate::{
    COMMAND_TARGET, CONSOLE_TARGET, Data, ENFORCEMENT_TARGET, ERROR_TARGET, Error, SYNC_TARGET,
};
use poise::{Context, FrameworkError};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Command log file name
pub const COMMAND_LOG_FILE: &str = "commands";
/// Sync cycles and enforcement decisions, kept apart as an audit trail
pub const ENFORCEMENT_LOG_FILE: &str = "enforcement";

/// Whether an event belongs in the enforcement audit log
fn is_enforcement_target(target: &str) -> bool {
    target.starts_with(ENFORCEMENT_TARGET) || target.starts_with(SYNC_TARGET)
}

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let command_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, COMMAND_LOG_FILE);
    let enforcement_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, ENFORCEMENT_LOG_FILE);

    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // Everything except the audit trail goes to the command log
    let command_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file)
        .with_filter(filter_fn(|meta| !is_enforcement_target(meta.target())));

    let enforcement_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(enforcement_file)
        .with_filter(filter_fn(|meta| is_enforcement_target(meta.target())));

    // Default to INFO, keep serenity's gateway chatter out
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info")
            .add_directive("serenity=error".parse()?)
            .add_directive("reqwest=warn".parse()?),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(command_layer)
        .with(enforcement_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

// Store command start time in the context data
thread_local! {
    static COMMAND_START_TIME: std::cell::RefCell<Option<Instant>> = const { std::cell::RefCell::new(None) };
}

fn location(ctx: Context<'_, Data, Error>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub fn log_command_start(ctx: Context<'_, Data, Error>) {
    COMMAND_START_TIME.with(|cell| {
        *cell.borrow_mut() = Some(Instant::now());
    });

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        location = %location(ctx),
        user_id = ctx.author().id.get(),
        invocation = %ctx.invocation_string(),
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub fn log_command_end(ctx: Context<'_, Data, Error>) {
    let duration =
        COMMAND_START_TIME.with(|cell| cell.borrow_mut().take().map(|start| start.elapsed()));
    let duration_ms = u64::try_from(duration.map_or(0, |d| d.as_millis())).unwrap_or_default();

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        location = %location(ctx),
        user_id = ctx.author().id.get(),
        duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                location = %location(*ctx),
                user_id = ctx.author().id.get(),
                error = %error,
                "Command error"
            );
        }
        FrameworkError::ArgumentParse { error, input, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                user_id = ctx.author().id.get(),
                input = ?input,
                error = %error,
                "Command arguments could not be parsed"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

pub fn log_console(message: impl AsRef<str>) {
    info!(
        target: CONSOLE_TARGET,
        message = %message.as_ref(),
        event = "console",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enforcement_targets_are_routed_to_audit_log() {
        assert!(is_enforcement_target(ENFORCEMENT_TARGET));
        assert!(is_enforcement_target(SYNC_TARGET));
        assert!(!is_enforcement_target(COMMAND_TARGET));
        assert!(!is_enforcement_target(ERROR_TARGET));
    }
}
