pub mod discord;
pub mod dispatcher;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use dispatcher::CommandDispatcher;
pub use types::{ChatPlatform, Destination, IncomingMessage};
