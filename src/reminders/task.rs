//! The stored reminder record.

use chrono::NaiveDateTime;

use crate::reminders::clock::DISPLAY_FORMAT;

/// A request to deliver `notification_text` to `chat_id` at `notification_date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTask {
    pub id: i64,
    pub chat_id: i64,
    pub notification_text: String,
    /// Local time in the bot's timezone, minute precision.
    pub notification_date: NaiveDateTime,
}

impl ReminderTask {
    pub fn display_date(&self) -> String {
        self.notification_date.format(DISPLAY_FORMAT).to_string()
    }
}
