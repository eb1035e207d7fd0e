//! Outbound messages: the `Messenger` seam and its teloxide implementation.

use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{debug, warn};

/// Outcome of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed(String),
}

/// Sends one text message to one chat.
///
/// Implementations never retry and never return an error: a failed send is
/// logged and reported as `Delivery::Failed`.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Delivery;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Delivery {
        match self.bot.send_message(ChatId(chat_id), text).await {
            Ok(msg) => {
                debug!("Sent msg {} to chat {}", msg.id.0, chat_id);
                Delivery::Delivered
            }
            Err(e) => {
                let msg = format!("Failed to send to chat {chat_id}: {e}");
                warn!("{}", msg);
                Delivery::Failed(msg)
            }
        }
    }
}
