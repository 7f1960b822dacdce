//! Room bookings
//!
//! The booking store keeps reservations; the booking service turns a
//! detected booking intent into a store call and an Italian reply.

mod service;
mod store;

pub use service::{BookingReply, BookingService};
pub use store::InMemoryBookingStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use concierge_text_processing::RoomType;

/// Booking store errors
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Booking {0} belongs to another guest")]
    NotOwner(String),

    #[error("Booking {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("No {0} room available for the requested dates")]
    Unavailable(RoomType),

    #[error("Invalid dates: {0}")]
    InvalidDates(String),

    #[error("Too many guests for a {room} room (max {max})")]
    TooManyGuests { room: RoomType, max: u32 },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for BookingError {
    fn from(err: std::io::Error) -> Self {
        BookingError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(err: serde_json::Error) -> Self {
        BookingError::Storage(err.to_string())
    }
}

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Italian label used in replies
    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed => "confermata",
            Self::Cancelled => "annullata",
        }
    }
}

/// A room reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// 24 lowercase hex characters
    pub id: String,
    pub user_id: String,
    pub room_type: RoomType,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    #[serde(default)]
    pub special_requests: Vec<String>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }

    /// Whether the stay overlaps `[check_in, check_out)`
    pub fn overlaps(&self, check_in: NaiveDate, check_out: NaiveDate) -> bool {
        self.check_in < check_out && check_in < self.check_out
    }
}

/// Data for a new booking
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub user_id: String,
    pub room_type: RoomType,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub special_requests: Vec<String>,
}

/// Fields to change on an existing booking
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingUpdate {
    pub room_type: Option<RoomType>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<u32>,
}

impl BookingUpdate {
    pub fn is_empty(&self) -> bool {
        self.room_type.is_none()
            && self.check_in.is_none()
            && self.check_out.is_none()
            && self.guests.is_none()
    }
}

/// Maximum occupancy per room type
pub fn max_guests(room: RoomType) -> u32 {
    match room {
        RoomType::Standard => 2,
        RoomType::Deluxe => 3,
        RoomType::Suite => 4,
        RoomType::Villa => 8,
    }
}

/// New 24-character hex id: seconds since epoch followed by random bytes
pub fn new_booking_id() -> String {
    let seconds = Utc::now().timestamp() as u32;
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{:08x}{}", seconds, &random[..16])
}

/// Booking store trait
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Bookings of one guest, by check-in date
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError>;

    async fn get(&self, booking_id: &str) -> Result<Option<Booking>, BookingError>;

    async fn create(&self, booking: NewBooking) -> Result<Booking, BookingError>;

    async fn cancel(&self, booking_id: &str, user_id: &str) -> Result<Booking, BookingError>;

    async fn update(
        &self,
        booking_id: &str,
        user_id: &str,
        changes: BookingUpdate,
    ) -> Result<Booking, BookingError>;

    async fn add_special_request(
        &self,
        booking_id: &str,
        user_id: &str,
        request: &str,
    ) -> Result<Booking, BookingError>;

    async fn is_available(
        &self,
        room_type: RoomType,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, BookingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_id_format() {
        let id = new_booking_id();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, new_booking_id());
    }

    #[test]
    fn test_overlap() {
        let d = |day| NaiveDate::from_ymd_opt(2030, 7, day).unwrap();
        let booking = Booking {
            id: new_booking_id(),
            user_id: "guest".to_string(),
            room_type: RoomType::Suite,
            check_in: d(10),
            check_out: d(15),
            guests: 2,
            special_requests: Vec::new(),
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(booking.nights(), 5);
        assert!(booking.overlaps(d(14), d(20)));
        // Check-out day is free for the next guest
        assert!(!booking.overlaps(d(15), d(20)));
        assert!(!booking.overlaps(d(1), d(10)));
    }
}
