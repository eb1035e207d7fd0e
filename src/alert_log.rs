//! Forwards warnings and errors to an operator chat.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram rejects longer messages.
const MAX_ALERT_CHARS: usize = 4000;

/// Alerts arriving within this window go out as one message.
const BATCH_WINDOW: Duration = Duration::from_secs(10);

pub struct AlertLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl AlertLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut pending: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(BATCH_WINDOW);

            loop {
                tokio::select! {
                    alert = rx.recv() => match alert {
                        Some(text) => pending.push(text),
                        None => break,
                    },
                    _ = interval.tick() => {
                        if !pending.is_empty() {
                            let text = truncate(&pending.join("\n"));
                            pending.clear();
                            // Not logged through tracing: it would feed back into this layer
                            if let Err(e) = bot.send_message(chat_id, text).await {
                                eprintln!("Failed to send alert to Telegram: {e}");
                            }
                        }
                    }
                }
            }
        });

        Self { tx }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_ALERT_CHARS {
        let truncated: String = text.chars().take(MAX_ALERT_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

fn format_alert(level: Level, target: &str, message: &str) -> String {
    let marker = if level == Level::ERROR { "❌" } else { "⚠️" };
    format!("{marker} [{target}] {message}")
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message.push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let alert = format_alert(level, event.metadata().target(), &visitor.message);
        if self.tx.send(alert).is_err() {
            eprintln!("Alert channel closed, message dropped");
        }
    }
}
