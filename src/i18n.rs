//! Message catalogs
//!
//! The engine and commands never build user-facing text themselves. They
//! name a `MessageKey` and pass positional arguments, which are substituted
//! into `{0}`, `{1}`, ... placeholders of the catalog entry.

use derive_more::Display;
use std::fmt::Display as FmtDisplay;

/// Language every lookup falls back to
pub const FALLBACK_LANG: &str = "en";

/// Keys for every user- or admin-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MessageKey {
    /// Args: warning ordinal, threshold, balance
    #[display("warningBelowThreshold")]
    WarningBelowThreshold,
    #[display("kickedDueToBalance")]
    KickedDueToBalance,
    #[display("botDeactivatedWarning")]
    BotDeactivatedWarning,
    /// Args: hours without a join
    #[display("noRecentJoins")]
    NoRecentJoins,
    #[display("adminOnly")]
    AdminOnly,
    #[display("forceKickStarted")]
    ForceKickStarted,
    /// Args: removed count
    #[display("forceKickCompleted")]
    ForceKickCompleted,
    /// Args: threshold
    #[display("thresholdUpdated")]
    ThresholdUpdated,
    /// Args: admin id
    #[display("adminAdded")]
    AdminAdded,
}

fn english(key: MessageKey) -> &'static str {
    match key {
        MessageKey::WarningBelowThreshold => {
            "Warning {0} of 3: your balance is below the required {1} (current balance: {2}). Top up within 24 hours to keep your place in the group."
        }
        MessageKey::KickedDueToBalance => {
            "You have been removed from the group because your balance stayed below the required threshold."
        }
        MessageKey::BotDeactivatedWarning => {
            "The bot has lost access to the group. Balance enforcement is paused until it is restored."
        }
        MessageKey::NoRecentJoins => {
            "No new member has joined the group in the last {0} hours. Please check that invitations still work."
        }
        MessageKey::AdminOnly => "This command is only available to administrators.",
        MessageKey::ForceKickStarted => "Starting force kick process...",
        MessageKey::ForceKickCompleted => "Force kick completed. {0} users were removed.",
        MessageKey::ThresholdUpdated => "Threshold updated to {0}.",
        MessageKey::AdminAdded => "User {0} is now an administrator.",
    }
}

fn russian(key: MessageKey) -> &'static str {
    match key {
        MessageKey::WarningBelowThreshold => {
            "Предупреждение {0} из 3: ваш баланс ниже требуемого {1} (текущий баланс: {2}). Пополните его в течение 24 часов, чтобы остаться в группе."
        }
        MessageKey::KickedDueToBalance => {
            "Вы удалены из группы, так как ваш баланс оставался ниже требуемого порога."
        }
        MessageKey::BotDeactivatedWarning => {
            "Бот потерял доступ к группе. Проверка балансов приостановлена до восстановления доступа."
        }
        MessageKey::NoRecentJoins => {
            "За последние {0} ч. в группу не вступил ни один новый участник. Проверьте, работают ли приглашения."
        }
        MessageKey::AdminOnly => "Эта команда доступна только администраторам.",
        MessageKey::ForceKickStarted => "Запуск принудительного удаления...",
        MessageKey::ForceKickCompleted => "Принудительное удаление завершено. Удалено пользователей: {0}.",
        MessageKey::ThresholdUpdated => "Порог изменён на {0}.",
        MessageKey::AdminAdded => "Пользователь {0} теперь администратор.",
    }
}

/// Looks up catalog entries and fills their placeholders
#[derive(Debug, Clone, Default)]
pub struct Translator;

impl Translator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Languages with a catalog
    #[must_use]
    pub fn supports(lang: &str) -> bool {
        matches!(lang, "en" | "ru")
    }

    /// Render a message in `lang`, falling back to English for unknown languages
    #[must_use]
    pub fn translate(&self, lang: &str, key: MessageKey, args: &[&dyn FmtDisplay]) -> String {
        let template = match lang {
            "ru" => russian(key),
            _ => english(key),
        };
        fill(template, args)
    }
}

/// Replace `{n}` placeholders with the matching argument; unmatched placeholders stay as-is
fn fill(template: &str, args: &[&dyn FmtDisplay]) -> String {
    let mut out = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        out = out.replace(&format!("{{{i}}}"), &arg.to_string());
    }
    out
}
