//! Domain reactors
//!
//! Each reactor owns one class of live collection and all of its update
//! logic. Nothing outside a reactor mutates its collections; the UI reads
//! snapshots through accessors and observes changes via each reactor's
//! event channel.

mod livemap;
mod mailer;
mod notifier;

pub use livemap::{LivemapEvent, LivemapReactor};
pub use mailer::{MailerEvent, MailerReactor};
pub use notifier::{NotifierEvent, NotifierReactor};
