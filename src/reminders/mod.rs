//! Reminder bot - parses reminder requests, stores them, delivers them on time.

pub mod clock;
pub mod database;
pub mod parser;
pub mod router;
pub mod scheduler;
pub mod task;
pub mod telegram;


pub use clock::Clock;
pub use database::{Database, InsertOutcome, StorageError};
pub use router::{Command, Rejection, ReminderService};
pub use scheduler::{MAX_DELIVERY_ATTEMPTS, Scheduler, SchedulerHandle, TickReport};
pub use task::ReminderTask;
pub use telegram::{Delivery, Messenger, TelegramClient};
