//! Inbound message handling: `/start`, `/reminders`, and reminder creation.

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::reminders::clock::Clock;
use crate::reminders::database::{Database, InsertOutcome};
use crate::reminders::parser::{ParseError, parse_reminder};
use crate::reminders::task::ReminderTask;
use crate::reminders::telegram::Messenger;

pub const START_COMMAND: &str = "/start";
pub const LIST_COMMAND: &str = "/reminders";

pub const WELCOME_TEXT: &str = "Welcome!

Here you can create a reminder.
Send a message in the format:
\"dd.mm.yyyy HH:mm Reminder text\"
(e.g. 01.01.2030 20:00 Do homework)

/reminders - active reminders";

pub const NO_REMINDERS_TEXT: &str = "You have no reminders";

const LIST_HEADER: &str = "Your reminders:\n\n";

/// Why a reminder was not created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Text is not `dd.mm.yyyy HH:mm text`, or the date/time does not exist
    /// (calendar-invalid, or skipped by a daylight-saving jump).
    Format,
    /// Time is not in the future.
    PastTime,
    /// Same time and text already stored.
    Duplicate,
    /// Storage failed.
    Unavailable,
}

impl Rejection {
    pub fn reply(self) -> &'static str {
        match self {
            Rejection::Format => {
                "To create a reminder use the format: \"dd.mm.yyyy HH:mm Reminder text\"\n(e.g. 01.01.2030 20:00 Do homework)"
            }
            Rejection::PastTime => "Sorry, a reminder can't be set in the past. Check the date and time",
            Rejection::Duplicate => "This reminder already exists",
            Rejection::Unavailable => "Something went wrong, please try again later",
        }
    }
}

/// What an inbound text asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    List,
    Create(&'a str),
}

impl<'a> Command<'a> {
    /// Exact, case-sensitive match; anything else is a reminder attempt.
    pub fn classify(text: &'a str) -> Self {
        match text {
            START_COMMAND => Command::Start,
            LIST_COMMAND => Command::List,
            other => Command::Create(other),
        }
    }
}

pub fn confirmation_text(date: &str, text: &str) -> String {
    format!("Reminder created!\n{date} I will remind you: {text}")
}

/// Render the reminder list for one chat.
pub fn render_list(tasks: &[ReminderTask]) -> String {
    if tasks.is_empty() {
        return NO_REMINDERS_TEXT.to_string();
    }

    let entries: Vec<String> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            format!(
                "{}. id: {}, date: {}, text: {}",
                i + 1,
                task.id,
                task.display_date(),
                task.notification_text
            )
        })
        .collect();

    format!("{LIST_HEADER}{}", entries.join("\n\n"))
}

/// Routes chat messages and answers them through a `Messenger`.
pub struct ReminderService {
    database: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    clock: Clock,
}

impl ReminderService {
    pub fn new(database: Arc<Database>, messenger: Arc<dyn Messenger>, clock: Clock) -> Self {
        Self { database, messenger, clock }
    }

    /// Handle one inbound message. Messages without text are ignored.
    pub async fn handle_message(&self, chat_id: i64, text: Option<&str>) {
        self.handle_message_at(chat_id, text, self.clock.now()).await;
    }

    pub async fn handle_message_at(&self, chat_id: i64, text: Option<&str>, now: NaiveDateTime) {
        let Some(text) = text else {
            debug!("Ignoring non-text message in chat {}", chat_id);
            return;
        };

        let reply = match Command::classify(text) {
            Command::Start => WELCOME_TEXT.to_string(),
            Command::List => self.list_reminders(chat_id),
            Command::Create(text) => match self.create_reminder(chat_id, text, now) {
                Ok(task) => {
                    info!("⏰ Reminder #{} created for chat {} at {}", task.id, chat_id, task.display_date());
                    confirmation_text(&task.display_date(), &task.notification_text)
                }
                Err(rejection) => {
                    debug!("Rejected reminder from chat {}: {:?}", chat_id, rejection);
                    rejection.reply().to_string()
                }
            },
        };

        // Send failures are already logged by the messenger
        self.messenger.send_text(chat_id, &reply).await;
    }

    /// Validate and store a reminder.
    pub fn create_reminder(
        &self,
        chat_id: i64,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<ReminderTask, Rejection> {
        let parsed = parse_reminder(text).map_err(|e| {
            if let ParseError::InvalidDate(reason) = e {
                debug!("Invalid date in chat {}: {}", chat_id, reason);
            }
            Rejection::Format
        })?;

        if !self.clock.exists_locally(parsed.date) {
            debug!("Chat {} asked for {}, skipped by a clock change", chat_id, parsed.date);
            return Err(Rejection::Format);
        }

        if parsed.date <= now {
            return Err(Rejection::PastTime);
        }

        match self.database.insert(chat_id, &parsed.text, parsed.date) {
            Ok(InsertOutcome::Created(task)) => Ok(task),
            Ok(InsertOutcome::Duplicate) => Err(Rejection::Duplicate),
            Err(e) => {
                error!("Failed to store reminder for chat {}: {}", chat_id, e);
                Err(Rejection::Unavailable)
            }
        }
    }

    pub fn list_reminders(&self, chat_id: i64) -> String {
        match self.database.find_by_chat(chat_id) {
            Ok(tasks) => render_list(&tasks),
            Err(e) => {
                error!("Failed to list reminders for chat {}: {}", chat_id, e);
                Rejection::Unavailable.reply().to_string()
            }
        }
    }
}
