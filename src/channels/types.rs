//! Platform-neutral types for the messaging boundary.

use async_trait::async_trait;

/// A chat/group on the messaging platform that can receive a reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Platform-assigned identifier; can drift across reconnections
    pub id: String,
    /// Human-readable name; stable across identifier drift
    pub name: String,
}

/// An inbound text message, normalized across platform adapters.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Identifier of the destination the message arrived from
    pub chat_id: String,
    /// Display name of that destination
    pub chat_name: String,
    pub sender_name: String,
    pub text: String,
}

/// What the core requires from the messaging-platform client.
///
/// Calls are bounded by the platform client's own timeouts; the core adds
/// none of its own and isolates per-call failures instead.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Enumerate the destinations currently visible to the bot.
    async fn list_destinations(&self) -> Result<Vec<Destination>, String>;

    /// Send a plain text message to a destination identifier.
    async fn send_message(&self, destination_id: &str, text: &str) -> Result<(), String>;
}
