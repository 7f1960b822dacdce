//! Text processing for the concierge chat
//!
//! This crate provides:
//! - **Intent Detection**: classify guest messages into booking intents
//! - **Entity Extraction**: booking ids, dates, room type, guest count and
//!   special requests from free Italian text
//! - **Message Formatting**: split model replies into menu/activity/event
//!   cards and render them as HTML
//!
//! # Example
//!
//! ```
//! use concierge_text_processing::{BookingIntent, BookingIntentMatcher};
//!
//! let matcher = BookingIntentMatcher::new();
//! let detected = matcher.detect("Vorrei vedere le mie prenotazioni");
//! assert_eq!(detected.intent, BookingIntent::List);
//! ```

pub mod extraction;
pub mod formatter;
pub mod intent;

pub use extraction::{BookingEntities, RoomType, UnknownRoomType};
pub use formatter::{
    FormattedItem, FormattedMessage, FormattedSection, MessageFormatter, SectionKind,
};
pub use intent::{BookingIntent, BookingIntentMatcher, DetectedBookingIntent};
