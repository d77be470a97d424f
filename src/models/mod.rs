//! Data models for the LifeLink application.
//!
//! Field names serialize in camelCase to match the PWA client.

mod appointment;
mod conversation;
mod donation;
mod notification;
mod request;
mod revision;
mod user;

pub use appointment::*;
pub use conversation::*;
pub use donation::*;
pub use notification::*;
pub use request::*;
pub use revision::*;
pub use user::*;
