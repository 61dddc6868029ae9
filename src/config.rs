use chrono_tz::Tz;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    /// Path of the persisted birthday collection
    pub data_file: String,
    /// Fixed zone every "today"/"current year" computation uses
    pub timezone: Tz,
    /// Cron expression for the daily check (seconds-resolution, 6 fields)
    pub reminder_cron: String,
    /// Delay before the startup check, so the platform client can finish
    /// connecting
    pub startup_grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let timezone: Tz = env::var("BOT_TIMEZONE")
            .unwrap_or_else(|_| "America/Argentina/Buenos_Aires".to_string())
            .parse()
            .expect("BOT_TIMEZONE must be a valid IANA timezone name");

        Self {
            discord_token: env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN must be set"),
            data_file: env::var("BIRTHDAYS_FILE").unwrap_or_else(|_| "./birthdays.json".to_string()),
            timezone,
            reminder_cron: env::var("REMINDER_CRON").unwrap_or_else(|_| "0 0 0 * * *".to_string()),
            startup_grace_secs: env::var("STARTUP_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }
}
