pub mod message;
pub mod ntfy;

pub use message::{Notification, Priority};
pub use ntfy::NtfyNotifier;
