//! Chatsweep - Telegram sweep and log-marquee bot
//!
//! A Telegram bot that bulk-deletes message ranges on command, renders a log
//! file into a chat message as an auto-scrolling marquee, and filters
//! near-duplicate / stop-worded messages before forwarding them.

/// Telegram bot surface: commands, keyboards, handlers
pub mod bot;
/// Configuration management
pub mod config;
/// Duplicate and stop-word message filtering
pub mod filter;
/// Sliding-window log rendering
pub mod marquee;
/// Bulk message deletion
pub mod sweeper;
pub mod utils;
