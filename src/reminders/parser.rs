//! Parsing of `dd.mm.yyyy HH:mm <text>` reminder messages.

use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

use crate::reminders::clock::DISPLAY_FORMAT;

/// 16-character date/time token, whitespace, non-empty body.
static REMINDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(\d{2}\.\d{2}\.\d{4} \d{2}:\d{2})\s+(\S.*)$").expect("reminder pattern is valid")
});

/// A reminder request extracted from message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReminder {
    pub date: NaiveDateTime,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Text does not have the `date time body` shape.
    Shape,
    /// Shape matches but the token is not a real calendar date/time.
    InvalidDate(String),
}

/// Parse a reminder message.
pub fn parse_reminder(input: &str) -> Result<ParsedReminder, ParseError> {
    let caps = REMINDER_PATTERN.captures(input.trim()).ok_or(ParseError::Shape)?;

    let date_token = &caps[1];
    let date = NaiveDateTime::parse_from_str(date_token, DISPLAY_FORMAT)
        .map_err(|e| ParseError::InvalidDate(format!("'{}': {}", date_token, e)))?;
    let text = caps[2].trim_end().to_string();

    Ok(ParsedReminder { date, text })
}
