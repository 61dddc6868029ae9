//! Discord adapter: the concrete messaging-platform collaborator.
//!
//! Provides destination enumeration and message sending over the Discord
//! REST API, and feeds inbound guild messages to the command dispatcher.
//! The core never talks to serenity directly; everything crosses the
//! [`ChatPlatform`] seam.

use crate::channels::dispatcher::CommandDispatcher;
use crate::channels::types::{ChatPlatform, Destination, IncomingMessage};
use crate::scheduler::ReminderScheduler;
use crate::store::BirthdayStore;
use async_trait::async_trait;
use serenity::all::{
    Channel, ChannelId, ChannelType, Client, Context, EventHandler, GatewayIntents, Message, Ready,
};
use serenity::http::Http;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// REST-side platform handle, independent of the gateway connection.
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    /// Every text channel in every guild the bot belongs to.
    async fn list_destinations(&self) -> Result<Vec<Destination>, String> {
        let guilds = self
            .http
            .get_guilds(None, None)
            .await
            .map_err(|e| format!("Failed to list guilds: {}", e))?;

        let mut destinations = Vec::new();
        for guild in guilds {
            let channels = self
                .http
                .get_channels(guild.id)
                .await
                .map_err(|e| format!("Failed to list channels of {}: {}", guild.name, e))?;
            for channel in channels {
                if channel.kind == ChannelType::Text {
                    destinations.push(Destination {
                        id: channel.id.to_string(),
                        name: channel.name.clone(),
                    });
                }
            }
        }
        Ok(destinations)
    }

    async fn send_message(&self, destination_id: &str, text: &str) -> Result<(), String> {
        let id: u64 = destination_id
            .parse()
            .map_err(|_| format!("Invalid destination id: {}", destination_id))?;
        if id == 0 {
            return Err("Invalid destination id: 0".to_string());
        }
        ChannelId::new(id)
            .say(&self.http, text)
            .await
            .map_err(|e| format!("Failed to send message: {}", e))?;
        Ok(())
    }
}

struct BotHandler {
    dispatcher: Arc<CommandDispatcher>,
    scheduler: Arc<ReminderScheduler>,
    scheduler_started: AtomicBool,
}

#[serenity::async_trait]
impl EventHandler for BotHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        // Ignore messages from bots (including ourselves)
        if msg.author.bot {
            return;
        }
        let text = msg.content.trim().to_string();
        if !text.starts_with('!') {
            return;
        }

        let chat_name = match msg.channel(&ctx).await {
            Ok(Channel::Guild(channel)) => channel.name.clone(),
            _ => "Chat individual".to_string(),
        };

        let incoming = IncomingMessage {
            chat_id: msg.channel_id.to_string(),
            chat_name,
            sender_name: msg.author.name.clone(),
            text,
        };

        if let Some(reply) = self.dispatcher.dispatch(&incoming).await {
            if let Err(e) = msg.channel_id.say(&ctx.http, &reply).await {
                log::error!("Discord: Failed to send reply: {}", e);
            }
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        log::info!("Discord: Bot connected as {}", ready.user.name);

        // Ready fires again on reconnect; the scheduler starts only once
        if self
            .scheduler_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let scheduler = self.scheduler.clone();
            tokio::spawn(async move {
                scheduler.run().await;
            });
        }
    }
}

/// Run the Discord client until a fatal error or Ctrl-C.
///
/// On shutdown the store is flushed before the gateway session is released.
/// An authentication/session failure is returned to the caller, which
/// treats it as fatal for the whole process.
pub async fn run_bot(
    token: &str,
    dispatcher: Arc<CommandDispatcher>,
    scheduler: Arc<ReminderScheduler>,
    store: Arc<BirthdayStore>,
) -> Result<(), String> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = BotHandler {
        dispatcher,
        scheduler,
        scheduler_started: AtomicBool::new(false),
    };

    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| format!("Failed to create Discord client: {}", e))?;

    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutdown signal received, flushing store");
            if let Err(e) = store.save() {
                log::error!("Failed to flush store on shutdown: {}", e);
            }
            shard_manager.shutdown_all().await;
            Ok(())
        }
        result = client.start() => {
            result.map_err(|e| format!("Discord client error: {}", e))
        }
    }
}
