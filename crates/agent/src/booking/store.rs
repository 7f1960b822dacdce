//! In-memory booking store with optional JSON file persistence

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;

use concierge_text_processing::RoomType;

use super::{
    max_guests, new_booking_id, Booking, BookingError, BookingStatus, BookingStore,
    BookingUpdate, NewBooking,
};

/// Rooms per type
fn default_capacity() -> HashMap<RoomType, u32> {
    HashMap::from([
        (RoomType::Standard, 10),
        (RoomType::Deluxe, 6),
        (RoomType::Suite, 3),
        (RoomType::Villa, 2),
    ])
}

/// Booking store kept in memory
///
/// When a persistence path is set, the full booking list is rewritten to it
/// after every change and loaded back on start.
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<String, Booking>>,
    capacity: HashMap<RoomType, u32>,
    persistence_path: Option<PathBuf>,
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            bookings: RwLock::new(HashMap::new()),
            capacity: default_capacity(),
            persistence_path: None,
        }
    }

    /// Store backed by a JSON file; existing bookings are loaded
    pub fn with_persistence(path: impl Into<PathBuf>) -> Result<Self, BookingError> {
        let path = path.into();
        let bookings = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let list: Vec<Booking> = if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            };
            tracing::info!(
                file = %path.display(),
                bookings = list.len(),
                "Loaded bookings"
            );
            list.into_iter().map(|b| (b.id.clone(), b)).collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            bookings: RwLock::new(bookings),
            capacity: default_capacity(),
            persistence_path: Some(path),
        })
    }

    /// Override the number of rooms of one type
    pub fn with_capacity(mut self, room_type: RoomType, rooms: u32) -> Self {
        self.capacity.insert(room_type, rooms);
        self
    }

    pub fn len(&self) -> usize {
        self.bookings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.read().is_empty()
    }

    fn persist(&self, bookings: &HashMap<String, Booking>) -> Result<(), BookingError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let mut list: Vec<&Booking> = bookings.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let content = serde_json::to_string_pretty(&list)?;
        write_atomic(path, &content)
    }

    /// Rooms of `room_type` still free over the stay, ignoring `exclude`
    fn free_rooms(
        &self,
        bookings: &HashMap<String, Booking>,
        room_type: RoomType,
        check_in: NaiveDate,
        check_out: NaiveDate,
        exclude: Option<&str>,
    ) -> u32 {
        let taken = bookings
            .values()
            .filter(|b| b.is_active() && b.room_type == room_type)
            .filter(|b| Some(b.id.as_str()) != exclude)
            .filter(|b| b.overlaps(check_in, check_out))
            .count() as u32;
        self.capacity
            .get(&room_type)
            .copied()
            .unwrap_or(0)
            .saturating_sub(taken)
    }

    /// Copy of a booking owned by `user_id`
    fn owned(
        bookings: &HashMap<String, Booking>,
        booking_id: &str,
        user_id: &str,
    ) -> Result<Booking, BookingError> {
        let booking = bookings
            .get(booking_id)
            .ok_or_else(|| BookingError::NotFound(booking_id.to_string()))?;
        if booking.user_id != user_id {
            return Err(BookingError::NotOwner(booking_id.to_string()));
        }
        Ok(booking.clone())
    }

    /// Store `booking` and persist; the map is left as it was if the write fails
    fn commit(
        &self,
        bookings: &mut HashMap<String, Booking>,
        booking: Booking,
    ) -> Result<(), BookingError> {
        let id = booking.id.clone();
        let previous = bookings.insert(id.clone(), booking);
        if let Err(e) = self.persist(bookings) {
            match previous {
                Some(previous) => {
                    bookings.insert(id.clone(), previous);
                }
                None => {
                    bookings.remove(&id);
                }
            }
            tracing::error!(booking_id = %id, error = %e, "Failed to persist bookings");
            return Err(e);
        }
        Ok(())
    }
}

fn validate_stay(
    room_type: RoomType,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: u32,
) -> Result<(), BookingError> {
    if check_out <= check_in {
        return Err(BookingError::InvalidDates(
            "check-out must be after check-in".to_string(),
        ));
    }
    if guests == 0 {
        return Err(BookingError::InvalidDates("at least one guest".to_string()));
    }
    let max = max_guests(room_type);
    if guests > max {
        return Err(BookingError::TooManyGuests {
            room: room_type,
            max,
        });
    }
    Ok(())
}

fn write_atomic(path: &Path, content: &str) -> Result<(), BookingError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError> {
        let mut list: Vec<Booking> = self
            .bookings
            .read()
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.check_in.cmp(&b.check_in).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn get(&self, booking_id: &str) -> Result<Option<Booking>, BookingError> {
        Ok(self.bookings.read().get(booking_id).cloned())
    }

    async fn create(&self, new: NewBooking) -> Result<Booking, BookingError> {
        validate_stay(new.room_type, new.check_in, new.check_out, new.guests)?;

        let mut bookings = self.bookings.write();
        if self.free_rooms(&bookings, new.room_type, new.check_in, new.check_out, None) == 0 {
            return Err(BookingError::Unavailable(new.room_type));
        }

        let now = Utc::now();
        let booking = Booking {
            id: new_booking_id(),
            user_id: new.user_id,
            room_type: new.room_type,
            check_in: new.check_in,
            check_out: new.check_out,
            guests: new.guests,
            special_requests: new.special_requests,
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };
        self.commit(&mut bookings, booking.clone())?;

        tracing::info!(
            booking_id = %booking.id,
            room_type = %booking.room_type,
            check_in = %booking.check_in,
            check_out = %booking.check_out,
            "Booking created"
        );

        Ok(booking)
    }

    async fn cancel(&self, booking_id: &str, user_id: &str) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.write();
        let mut cancelled = Self::owned(&bookings, booking_id, user_id)?;
        if cancelled.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled(booking_id.to_string()));
        }
        cancelled.status = BookingStatus::Cancelled;
        cancelled.updated_at = Utc::now();
        self.commit(&mut bookings, cancelled.clone())?;

        tracing::info!(booking_id = %booking_id, "Booking cancelled");
        Ok(cancelled)
    }

    async fn update(
        &self,
        booking_id: &str,
        user_id: &str,
        changes: BookingUpdate,
    ) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.write();

        let current = Self::owned(&bookings, booking_id, user_id)?;
        if current.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled(booking_id.to_string()));
        }

        let room_type = changes.room_type.unwrap_or(current.room_type);
        let check_in = changes.check_in.unwrap_or(current.check_in);
        let check_out = match (changes.check_in, changes.check_out) {
            (_, Some(out)) => out,
            // New arrival only: keep the length of stay
            (Some(new_in), None) => new_in + (current.check_out - current.check_in),
            (None, None) => current.check_out,
        };
        let guests = changes.guests.unwrap_or(current.guests);
        validate_stay(room_type, check_in, check_out, guests)?;

        if self.free_rooms(&bookings, room_type, check_in, check_out, Some(booking_id)) == 0 {
            return Err(BookingError::Unavailable(room_type));
        }

        let updated = Booking {
            room_type,
            check_in,
            check_out,
            guests,
            updated_at: Utc::now(),
            ..current
        };
        self.commit(&mut bookings, updated.clone())?;

        tracing::info!(booking_id = %booking_id, "Booking updated");
        Ok(updated)
    }

    async fn add_special_request(
        &self,
        booking_id: &str,
        user_id: &str,
        request: &str,
    ) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.write();
        let mut updated = Self::owned(&bookings, booking_id, user_id)?;
        if updated.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled(booking_id.to_string()));
        }
        updated.special_requests.push(request.trim().to_string());
        updated.updated_at = Utc::now();
        self.commit(&mut bookings, updated.clone())?;

        tracing::info!(booking_id = %booking_id, "Special request added");
        Ok(updated)
    }

    async fn is_available(
        &self,
        room_type: RoomType,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, BookingError> {
        if check_out <= check_in {
            return Err(BookingError::InvalidDates(
                "check-out must be after check-in".to_string(),
            ));
        }
        let bookings = self.bookings.read();
        Ok(self.free_rooms(&bookings, room_type, check_in, check_out, None) > 0)
    }
}
