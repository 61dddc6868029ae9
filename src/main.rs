//! Birthday reminder bot: sends a greeting to a group chat on each stored
//! birthday, once per year, and takes `!` commands from group members to
//! manage the list.

use std::sync::Arc;

mod channels;
mod config;
mod error;
mod resolver;
mod scheduler;
mod store;

use channels::discord::DiscordPlatform;
use channels::{ChatPlatform, CommandDispatcher};
use config::Config;
use resolver::ChannelResolver;
use scheduler::ReminderScheduler;
use store::BirthdayStore;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    log::info!("Loading birthdays from {}", config.data_file);
    let store = Arc::new(BirthdayStore::load(&config.data_file).expect("Failed to load birthday store"));
    log::info!("Loaded {} birthday record(s)", store.len());

    let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordPlatform::new(&config.discord_token));
    let resolver = Arc::new(ChannelResolver::new(store.clone(), platform.clone()));
    let scheduler = Arc::new(
        ReminderScheduler::new(store.clone(), resolver.clone(), platform.clone(), &config)
            .expect("REMINDER_CRON must be a valid cron expression"),
    );
    let dispatcher = Arc::new(CommandDispatcher::new(
        store.clone(),
        resolver,
        platform,
        config.timezone,
    ));

    log::info!(
        "Starting bot (timezone {}, daily check '{}')",
        config.timezone,
        config.reminder_cron
    );
    if let Err(e) = channels::discord::run_bot(&config.discord_token, dispatcher, scheduler, store).await
    {
        log::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}
