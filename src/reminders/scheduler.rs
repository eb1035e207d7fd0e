//! Minute-tick delivery of due reminders.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::reminders::clock::Clock;
use crate::reminders::database::Database;
use crate::reminders::telegram::{Delivery, Messenger};

/// Second zero of every minute (cron crate 7-field format).
const EVERY_MINUTE: &str = "0 * * * * * *";

/// Failed sends after which a reminder is dropped.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 10;

pub fn delivery_text(text: &str) -> String {
    format!("REMINDER!\n{text}")
}

/// Counts from a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub delivered: usize,
    /// Kept for a retry on the next tick.
    pub failed: usize,
    /// Dropped after `MAX_DELIVERY_ATTEMPTS` failures.
    pub abandoned: usize,
}

/// Finds reminders due at the current minute, delivers and removes them.
pub struct Scheduler {
    database: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    clock: Clock,
    /// Also pick up reminders whose minute already passed.
    catch_up_missed: bool,
}

impl Scheduler {
    pub fn new(database: Arc<Database>, messenger: Arc<dyn Messenger>, clock: Clock) -> Self {
        Self {
            database,
            messenger,
            clock,
            catch_up_missed: false,
        }
    }

    pub fn with_catch_up(mut self, catch_up_missed: bool) -> Self {
        self.catch_up_missed = catch_up_missed;
        self
    }

    /// Run one tick for `minute`.
    ///
    /// A task is deleted once its delivery succeeded. A failed task stays
    /// stored and every later tick retries it, until it has failed
    /// `MAX_DELIVERY_ATTEMPTS` times and is dropped.
    pub async fn tick_at(&self, minute: NaiveDateTime) -> TickReport {
        let due = if self.catch_up_missed {
            self.database.find_due(minute)
        } else {
            self.database.find_for_tick(minute)
        };

        let due = match due {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Failed to load due reminders for {}: {}", minute, e);
                return TickReport::default();
            }
        };

        let mut report = TickReport::default();
        if due.is_empty() {
            return report;
        }

        info!("Firing {} due reminder(s) for {}", due.len(), minute);

        for task in due {
            match self.messenger.send_text(task.chat_id, &delivery_text(&task.notification_text)).await {
                Delivery::Delivered => {
                    report.delivered += 1;
                    match self.database.delete(task.id) {
                        Ok(true) => info!("Sent reminder #{} to chat {}", task.id, task.chat_id),
                        Ok(false) => warn!("Reminder #{} was already gone after delivery", task.id),
                        Err(e) => error!("Failed to delete delivered reminder #{}: {}", task.id, e),
                    }
                }
                Delivery::Failed(reason) => match self.database.record_failed_delivery(task.id) {
                    Ok(attempts) if attempts >= MAX_DELIVERY_ATTEMPTS => {
                        report.abandoned += 1;
                        warn!("Dropping reminder #{} after {} failed deliveries: {}", task.id, attempts, reason);
                        if let Err(e) = self.database.delete(task.id) {
                            error!("Failed to delete abandoned reminder #{}: {}", task.id, e);
                        }
                    }
                    Ok(attempts) => {
                        report.failed += 1;
                        warn!("Keeping reminder #{} for retry (attempt {}): {}", task.id, attempts, reason);
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!("Failed to record failed delivery of reminder #{}: {}", task.id, e);
                    }
                },
            }
        }

        report
    }

    /// Spawn the tick loop. Ticks run one after another, never overlapping.
    pub fn start(self) -> SchedulerHandle {
        self.start_after(Utc::now())
    }

    /// Spawn the tick loop with the first tick at the first minute boundary
    /// after `after`. Every boundary gets its own tick: minutes that passed
    /// while a tick ran (or before `after` caught up with now) are ticked
    /// back to back.
    pub fn start_after(self, after: DateTime<Utc>) -> SchedulerHandle {
        let cancel = Arc::new(Notify::new());
        let cancel_clone = cancel.clone();

        let task = tokio::spawn(async move {
            let schedule = match Schedule::from_str(EVERY_MINUTE) {
                Ok(s) => s,
                Err(e) => {
                    error!("Invalid tick schedule: {}", e);
                    return;
                }
            };

            info!(
                "Scheduler started (timezone {}, catch-up {})",
                self.clock.timezone(),
                if self.catch_up_missed { "on" } else { "off" }
            );

            let mut last_fired = after;
            let mut lagging = false;

            loop {
                let Some(fire_at) = schedule.after(&last_fired).next() else {
                    error!("Tick schedule has no future occurrence");
                    return;
                };

                let behind = Utc::now() - fire_at;
                if behind >= TimeDelta::minutes(1) {
                    if !lagging {
                        warn!("Ticks are {} minute(s) behind, catching up from {}", behind.num_minutes(), fire_at);
                        lagging = true;
                    }
                } else if lagging {
                    info!("Ticks caught up");
                    lagging = false;
                }

                let wait = (fire_at - Utc::now()).to_std().unwrap_or_default();

                tokio::select! {
                    biased;

                    _ = cancel_clone.notified() => {
                        info!("Scheduler stopped");
                        return;
                    }
                    _ = tokio::time::sleep(wait) => {
                        // The fire instant, not the wake-up instant, names the minute
                        self.tick_at(self.clock.minute_of(fire_at)).await;
                        last_fired = fire_at;
                    }
                }
            }
        });

        SchedulerHandle { cancel, task }
    }
}

/// Owns the running tick loop.
pub struct SchedulerHandle {
    cancel: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop after the current tick (if any) and wait for it.
    pub async fn shutdown(self) {
        self.cancel.notify_one();
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}
