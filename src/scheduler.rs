//! Daily reminder scheduler.
//!
//! Runs once shortly after startup (grace delay so the platform client can
//! finish connecting) and thereafter at a fixed cron instant in the
//! configured timezone. Each trigger derives `(today, current_year)` exactly
//! once so every record in that run is judged against the same instant.

use crate::channels::types::ChatPlatform;
use crate::config::Config;
use crate::error::BotError;
use crate::resolver::ChannelResolver;
use crate::store::{BirthdayRecord, BirthdayStore};
use chrono::{Datelike, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// The reminder text: the record's custom message, or the default greeting.
pub fn compose_greeting(record: &BirthdayRecord) -> String {
    match &record.message {
        Some(message) => message.clone(),
        None => format!("🎉 ¡Feliz cumpleaños {}! 🎂🥳", record.name),
    }
}

pub struct ReminderScheduler {
    store: Arc<BirthdayStore>,
    resolver: Arc<ChannelResolver>,
    platform: Arc<dyn ChatPlatform>,
    tz: Tz,
    schedule: Schedule,
    startup_grace: Duration,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<BirthdayStore>,
        resolver: Arc<ChannelResolver>,
        platform: Arc<dyn ChatPlatform>,
        config: &Config,
    ) -> Result<Self, BotError> {
        let schedule = Schedule::from_str(&config.reminder_cron).map_err(|e| {
            BotError::Validation(format!(
                "Invalid cron expression '{}': {}",
                config.reminder_cron, e
            ))
        })?;
        Ok(Self {
            store,
            resolver,
            platform,
            tz: config.timezone,
            schedule,
            startup_grace: Duration::from_secs(config.startup_grace_secs),
        })
    }

    /// Run forever: startup pass, then one tick per cron instant.
    pub async fn run(self: Arc<Self>) {
        tokio::time::sleep(self.startup_grace).await;

        // Startup repair pass over all destination identifiers
        match self.resolver.resolve_all().await {
            Ok(0) => {}
            Ok(n) => log::info!("[SCHEDULER] Startup repair: {} identifier(s) updated", n),
            Err(e) => log::warn!("[SCHEDULER] Startup repair failed: {}", e),
        }

        self.trigger().await;

        loop {
            let Some(next) = self.schedule.upcoming(self.tz).next() else {
                log::error!("[SCHEDULER] Cron schedule yields no future instant, stopping");
                return;
            };
            let now = Utc::now().with_timezone(&self.tz);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            log::info!("[SCHEDULER] Next birthday check at {}", next);
            tokio::time::sleep(wait).await;
            self.trigger().await;
        }
    }

    async fn trigger(&self) {
        let now = Utc::now().with_timezone(&self.tz);
        let today = now.format("%d-%m").to_string();
        let current_year = now.year();
        self.tick(&today, current_year).await;
    }

    /// One scan-resolve-deliver-mark pass. Returns the delivery count.
    ///
    /// `today` and `current_year` are fixed for the whole pass. A record is
    /// skipped when it was already delivered for `current_year` (checked
    /// against the live store, so an overlapping run cannot double-send),
    /// when its destination is unresolved, or when delivery fails; no skip
    /// aborts the batch.
    pub async fn tick(&self, today: &str, current_year: i32) -> usize {
        log::info!(
            "[SCHEDULER] Checking birthdays for {} (year {})",
            today,
            current_year
        );

        let mut delivered = 0usize;
        for mut record in self.store.due_today(today) {
            if self.store.last_delivered_year(&record) == Some(current_year) {
                log::debug!(
                    "[SCHEDULER] Already sent for {} this year ({}), skipping",
                    record.name,
                    current_year
                );
                continue;
            }

            let destination = match self.resolver.resolve(&mut record).await {
                Ok(destination) => destination,
                Err(e) => {
                    log::warn!("[SCHEDULER] {} ({}), skipping", e, record.name);
                    continue;
                }
            };

            let text = compose_greeting(&record);
            if let Err(e) = self.platform.send_message(&destination.id, &text).await {
                log::error!(
                    "[SCHEDULER] Failed to deliver reminder for {}: {}",
                    record.name,
                    e
                );
                continue;
            }

            if let Err(e) = self.store.mark_delivered(&record, current_year) {
                log::error!(
                    "[SCHEDULER] Delivered but failed to mark {} for year {}: {}",
                    record.name,
                    current_year,
                    e
                );
            } else {
                log::info!(
                    "[SCHEDULER] Sent reminder for {} in {} (marked year {})",
                    record.name,
                    destination.name,
                    current_year
                );
            }
            delivered += 1;
        }

        delivered
    }
}
