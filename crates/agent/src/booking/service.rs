//! Booking service: detected intent in, Italian reply out

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use concierge_text_processing::{BookingIntent, DetectedBookingIntent, RoomType};

use super::{Booking, BookingError, BookingStore, BookingUpdate, NewBooking};

const LOGIN_REQUIRED: &str =
    "Per gestire le prenotazioni è necessario accedere con il proprio account.";
const ASK_BOOKING_ID: &str =
    "Mi può indicare il codice della prenotazione? È composto da 24 caratteri.";
const STORE_FAILURE: &str =
    "Mi dispiace, non riesco ad accedere alle prenotazioni in questo momento. Riprovi tra poco.";

/// Reply to a booking intent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingReply {
    pub intent: BookingIntent,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bookings: Vec<Booking>,
}

impl BookingReply {
    fn text(intent: BookingIntent, message: impl Into<String>) -> Self {
        Self {
            intent,
            message: message.into(),
            booking: None,
            bookings: Vec::new(),
        }
    }

    fn with_booking(mut self, booking: Booking) -> Self {
        self.booking = Some(booking);
        self
    }
}

/// Answers booking intents from a [`BookingStore`]
///
/// Missing data produces a question for the guest and store failures produce
/// an apology, so `handle` always has something to say.
pub struct BookingService {
    store: Arc<dyn BookingStore>,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    pub async fn handle(
        &self,
        detected: &DetectedBookingIntent,
        user_id: Option<&str>,
    ) -> BookingReply {
        let intent = detected.intent;
        let result = match (intent, user_id) {
            (BookingIntent::CheckAvailability, _) => self.check_availability(detected).await,
            (BookingIntent::General | BookingIntent::None, _) => Ok(BookingReply::text(
                intent,
                "Posso aiutarla a prenotare, modificare o annullare un soggiorno. Cosa desidera fare?",
            )),
            (_, None) => Ok(BookingReply::text(intent, LOGIN_REQUIRED)),
            (BookingIntent::List, Some(user)) => self.list(user).await,
            (BookingIntent::Details, Some(user)) => self.details(detected, user).await,
            (BookingIntent::Cancel, Some(user)) => self.cancel(detected, user).await,
            (BookingIntent::Update, Some(user)) => self.update(detected, user).await,
            (BookingIntent::SpecialRequest, Some(user)) => {
                self.special_request(detected, user).await
            }
            (BookingIntent::CreateBooking, Some(user)) => self.create(detected, user).await,
        };

        match result {
            Ok(reply) => reply,
            Err(e) => error_reply(intent, detected.booking_id.as_deref(), e),
        }
    }

    async fn list(&self, user_id: &str) -> Result<BookingReply, BookingError> {
        let bookings = self.store.list_for_user(user_id).await?;
        if bookings.is_empty() {
            return Ok(BookingReply::text(
                BookingIntent::List,
                "Non risultano prenotazioni a suo nome.",
            ));
        }

        let mut message = format!("Ecco le sue prenotazioni ({}):", bookings.len());
        for booking in &bookings {
            message.push('\n');
            message.push_str(&format!("- {}", summary(booking)));
        }
        Ok(BookingReply {
            intent: BookingIntent::List,
            message,
            booking: None,
            bookings,
        })
    }

    async fn details(
        &self,
        detected: &DetectedBookingIntent,
        user_id: &str,
    ) -> Result<BookingReply, BookingError> {
        let Some(id) = detected.booking_id.as_deref() else {
            return Ok(BookingReply::text(BookingIntent::Details, ASK_BOOKING_ID));
        };

        match self.store.get(id).await? {
            Some(booking) if booking.user_id == user_id => {
                let mut message = format!("Dettagli della prenotazione:\n{}", summary(&booking));
                if !booking.special_requests.is_empty() {
                    message.push_str(&format!(
                        "\nRichieste speciali: {}",
                        booking.special_requests.join("; ")
                    ));
                }
                Ok(BookingReply::text(BookingIntent::Details, message).with_booking(booking))
            }
            _ => Err(BookingError::NotFound(id.to_string())),
        }
    }

    async fn cancel(
        &self,
        detected: &DetectedBookingIntent,
        user_id: &str,
    ) -> Result<BookingReply, BookingError> {
        let Some(id) = detected.booking_id.as_deref() else {
            return Ok(BookingReply::text(BookingIntent::Cancel, ASK_BOOKING_ID));
        };

        let booking = self.store.cancel(id, user_id).await?;
        Ok(BookingReply::text(
            BookingIntent::Cancel,
            format!("La prenotazione {} è stata annullata.", booking.id),
        )
        .with_booking(booking))
    }

    async fn update(
        &self,
        detected: &DetectedBookingIntent,
        user_id: &str,
    ) -> Result<BookingReply, BookingError> {
        let Some(id) = detected.booking_id.as_deref() else {
            return Ok(BookingReply::text(BookingIntent::Update, ASK_BOOKING_ID));
        };

        let entities = &detected.entities;
        let changes = BookingUpdate {
            room_type: entities.room_type,
            check_in: entities.check_in(),
            check_out: entities.check_out(),
            guests: entities.guests,
        };
        if changes.is_empty() {
            return Ok(BookingReply::text(
                BookingIntent::Update,
                "Cosa desidera modificare? Posso cambiare date, tipo di camera o numero di ospiti.",
            ));
        }
        if let Some(check_in) = changes.check_in {
            ensure_not_past(check_in)?;
        }

        let booking = self.store.update(id, user_id, changes).await?;
        Ok(BookingReply::text(
            BookingIntent::Update,
            format!("Prenotazione aggiornata:\n{}", summary(&booking)),
        )
        .with_booking(booking))
    }

    async fn special_request(
        &self,
        detected: &DetectedBookingIntent,
        user_id: &str,
    ) -> Result<BookingReply, BookingError> {
        let Some(id) = detected.booking_id.as_deref() else {
            return Ok(BookingReply::text(BookingIntent::SpecialRequest, ASK_BOOKING_ID));
        };
        let Some(request) = detected.entities.special_request.as_deref() else {
            return Ok(BookingReply::text(
                BookingIntent::SpecialRequest,
                "Quale richiesta desidera aggiungere alla prenotazione?",
            ));
        };

        let booking = self.store.add_special_request(id, user_id, request).await?;
        Ok(BookingReply::text(
            BookingIntent::SpecialRequest,
            format!(
                "Ho aggiunto la richiesta \"{}\" alla prenotazione {}.",
                request, booking.id
            ),
        )
        .with_booking(booking))
    }

    async fn check_availability(
        &self,
        detected: &DetectedBookingIntent,
    ) -> Result<BookingReply, BookingError> {
        let entities = &detected.entities;
        let (Some(check_in), Some(check_out)) = (entities.check_in(), entities.check_out()) else {
            return Ok(BookingReply::text(
                BookingIntent::CheckAvailability,
                "Per verificare la disponibilità mi indichi le date di arrivo e partenza (es. 10/07/2025 - 15/07/2025).",
            ));
        };
        ensure_not_past(check_in)?;

        let period = format!("dal {} al {}", fmt_date(check_in), fmt_date(check_out));

        if let Some(room) = entities.room_type {
            let message = if self.store.is_available(room, check_in, check_out).await? {
                format!("Buone notizie: la camera {} è disponibile {}.", room, period)
            } else {
                format!("Mi dispiace, la camera {} non è disponibile {}.", room, period)
            };
            return Ok(BookingReply::text(BookingIntent::CheckAvailability, message));
        }

        let mut available = Vec::new();
        for room in RoomType::ALL {
            if self.store.is_available(room, check_in, check_out).await? {
                available.push(room.as_str());
            }
        }
        let message = if available.is_empty() {
            format!("Mi dispiace, non ci sono camere disponibili {}.", period)
        } else {
            format!("Camere disponibili {}: {}.", period, available.join(", "))
        };
        Ok(BookingReply::text(BookingIntent::CheckAvailability, message))
    }

    async fn create(
        &self,
        detected: &DetectedBookingIntent,
        user_id: &str,
    ) -> Result<BookingReply, BookingError> {
        let entities = &detected.entities;

        let mut missing = Vec::new();
        if entities.check_in().is_none() || entities.check_out().is_none() {
            missing.push("le date di arrivo e partenza");
        }
        if entities.room_type.is_none() {
            missing.push("il tipo di camera (Standard, Deluxe, Suite o Villa)");
        }
        if entities.guests.is_none() {
            missing.push("il numero di ospiti");
        }

        let (Some(check_in), Some(check_out), Some(room_type), Some(guests)) = (
            entities.check_in(),
            entities.check_out(),
            entities.room_type,
            entities.guests,
        ) else {
            return Ok(BookingReply::text(
                BookingIntent::CreateBooking,
                format!(
                    "Per completare la prenotazione mi servono ancora: {}.",
                    missing.join(", ")
                ),
            ));
        };
        ensure_not_past(check_in)?;

        let booking = self
            .store
            .create(NewBooking {
                user_id: user_id.to_string(),
                room_type,
                check_in,
                check_out,
                guests,
                special_requests: entities.special_request.iter().cloned().collect(),
            })
            .await?;

        Ok(BookingReply::text(
            BookingIntent::CreateBooking,
            format!(
                "Prenotazione confermata!\n{}\nCodice prenotazione: {}",
                summary(&booking),
                booking.id
            ),
        )
        .with_booking(booking))
    }
}

fn ensure_not_past(check_in: NaiveDate) -> Result<(), BookingError> {
    if check_in < Utc::now().date_naive() {
        return Err(BookingError::InvalidDates(
            "check-in date is in the past".to_string(),
        ));
    }
    Ok(())
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn summary(booking: &Booking) -> String {
    format!(
        "Camera {} dal {} al {} ({} notti), {} ospiti, {} [{}]",
        booking.room_type,
        fmt_date(booking.check_in),
        fmt_date(booking.check_out),
        booking.nights(),
        booking.guests,
        booking.status.label(),
        booking.id
    )
}

fn error_reply(intent: BookingIntent, booking_id: Option<&str>, error: BookingError) -> BookingReply {
    let message = match &error {
        BookingError::NotFound(id) | BookingError::NotOwner(id) => {
            format!("Non ho trovato la prenotazione {} tra quelle a suo nome.", id)
        }
        BookingError::AlreadyCancelled(id) => {
            format!("La prenotazione {} risulta già annullata.", id)
        }
        BookingError::Unavailable(room) => format!(
            "Mi dispiace, la camera {} non è disponibile per le date richieste.",
            room
        ),
        BookingError::InvalidDates(_) => {
            "Le date indicate non sono valide: l'arrivo deve essere oggi o in futuro e precedere la partenza."
                .to_string()
        }
        BookingError::TooManyGuests { room, max } => format!(
            "La camera {} può ospitare al massimo {} persone.",
            room, max
        ),
        BookingError::Storage(_) => {
            tracing::error!(
                intent = %intent,
                booking_id = ?booking_id,
                error = %error,
                "Booking store failure"
            );
            STORE_FAILURE.to_string()
        }
    };

    if !matches!(error, BookingError::Storage(_)) {
        tracing::debug!(intent = %intent, error = %error, "Booking request rejected");
    }

    BookingReply::text(intent, message)
}
