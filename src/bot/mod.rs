/// Command and message handlers
pub mod handlers;
/// Per-user sweep source preferences
pub mod prefs;
/// Rate-limit-aware send/edit wrappers
pub mod resilient;

pub use prefs::{SourceChoice, UserPreferences};
