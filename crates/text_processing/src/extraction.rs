//! Booking entity extraction
//!
//! Best-effort regex helpers over Italian guest messages. Every helper
//! returns `None`/empty when nothing usable is found.

use std::str::FromStr;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static BOOKING_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b[0-9a-f]{24}\b").unwrap());

// d/m/y, d.m.y or d-m-y; the two separators are compared after matching
static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})([/.\-])(\d{1,2})([/.\-])(\d{4}|\d{2})\b").unwrap()
});

static ROOM_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(standard|deluxe|suite|villa)\b").unwrap());

static GUEST_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,3})\s*(?:ospiti|ospite|persone|persona)\b").unwrap());

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)"|“([^”]+)”|«([^»]+)»"#).unwrap());

static REQUEST_TRIGGER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)(?:richiesta\s+speciale|vorrei\s+che|mi\s+piacerebbe|potreste|aggiungere\s+una\s+richiesta)(.*)$",
    )
    .unwrap()
});

/// Room categories the hotel sells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomType {
    Standard,
    Deluxe,
    Suite,
    Villa,
}

impl RoomType {
    pub const ALL: [RoomType; 4] = [
        RoomType::Standard,
        RoomType::Deluxe,
        RoomType::Suite,
        RoomType::Villa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Standard => "Standard",
            RoomType::Deluxe => "Deluxe",
            RoomType::Suite => "Suite",
            RoomType::Villa => "Villa",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown room type: {0}")]
pub struct UnknownRoomType(pub String);

impl FromStr for RoomType {
    type Err = UnknownRoomType;

    /// Case-insensitive room name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(RoomType::Standard),
            "deluxe" => Ok(RoomType::Deluxe),
            "suite" => Ok(RoomType::Suite),
            "villa" => Ok(RoomType::Villa),
            _ => Err(UnknownRoomType(s.to_string())),
        }
    }
}

impl std::fmt::Display for RoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything pulled out of one message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingEntities {
    /// Dates in order of appearance
    pub dates: Vec<NaiveDate>,
    pub room_type: Option<RoomType>,
    pub guests: Option<u32>,
    pub special_request: Option<String>,
}

impl BookingEntities {
    pub fn from_message(message: &str) -> Self {
        Self {
            dates: extract_dates(message),
            room_type: extract_room_type(message),
            guests: extract_guest_count(message),
            special_request: extract_special_request(message),
        }
    }

    pub fn check_in(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn check_out(&self) -> Option<NaiveDate> {
        self.dates.get(1).copied()
    }
}

/// First 24-character hexadecimal id, lowercased
pub fn extract_booking_id(message: &str) -> Option<String> {
    BOOKING_ID.find(message).map(|m| m.as_str().to_lowercase())
}

/// Dates written day-first; two-digit years are taken as 20xx
///
/// Impossible calendar dates (31/02/2024) are skipped.
pub fn extract_dates(message: &str) -> Vec<NaiveDate> {
    DATE.captures_iter(message)
        .filter(|caps| caps[2] == caps[4])
        .filter_map(|caps| {
            let day: u32 = caps[1].parse().ok()?;
            let month: u32 = caps[3].parse().ok()?;
            let year_str = &caps[5];
            let mut year: i32 = year_str.parse().ok()?;
            if year_str.len() == 2 {
                year += 2000;
            }
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .collect()
}

pub fn extract_room_type(message: &str) -> Option<RoomType> {
    ROOM_TYPE
        .captures(message)
        .and_then(|caps| caps[1].parse().ok())
}

pub fn extract_guest_count(message: &str) -> Option<u32> {
    GUEST_COUNT
        .captures(message)
        .and_then(|caps| caps[1].parse().ok())
        .filter(|n| *n > 0)
}

/// Quoted text, else whatever follows a request phrase
pub fn extract_special_request(message: &str) -> Option<String> {
    if let Some(caps) = QUOTED.captures(message) {
        let quoted = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        if quoted.is_some() {
            return quoted;
        }
    }

    REQUEST_TRIGGER
        .captures(message)
        .map(|caps| {
            caps[1]
                .trim_start_matches(|c: char| c.is_whitespace() || ":,;.-".contains(c))
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_booking_entities_from_request() {
        let entities = BookingEntities::from_message(
            "vorrei prenotare una camera Suite per 2 persone dal 10/07/2024 al 15/07/2024",
        );
        assert_eq!(entities.dates, vec![date(2024, 7, 10), date(2024, 7, 15)]);
        assert_eq!(entities.room_type, Some(RoomType::Suite));
        assert_eq!(entities.guests, Some(2));
        assert_eq!(entities.check_in(), Some(date(2024, 7, 10)));
        assert_eq!(entities.check_out(), Some(date(2024, 7, 15)));
    }

    #[test]
    fn test_booking_id() {
        assert_eq!(
            extract_booking_id("cancella 65A1B2C3D4E5F60718293A4B per favore"),
            Some("65a1b2c3d4e5f60718293a4b".to_string())
        );
        // 23 characters: not an id
        assert_eq!(extract_booking_id("65a1b2c3d4e5f60718293a4"), None);
        assert_eq!(extract_booking_id("nessun codice qui"), None);
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(
            extract_dates("dal 1.8.24 al 05-08-2024"),
            vec![date(2024, 8, 1), date(2024, 8, 5)]
        );
        // Mixed separators and impossible dates are ignored
        assert!(extract_dates("il 10/07-2024").is_empty());
        assert!(extract_dates("il 31/02/2024").is_empty());
    }

    #[test]
    fn test_room_type_whole_word() {
        assert_eq!(extract_room_type("una DELUXE vista mare"), Some(RoomType::Deluxe));
        assert_eq!(extract_room_type("una villetta"), None);
    }

    #[test]
    fn test_room_type_parse() {
        assert_eq!("SUITE".parse::<RoomType>(), Ok(RoomType::Suite));
        assert_eq!(
            "attico".parse::<RoomType>(),
            Err(UnknownRoomType("attico".to_string()))
        );
        for room in RoomType::ALL {
            assert_eq!(room.to_string().parse::<RoomType>(), Ok(room));
        }
    }

    #[test]
    fn test_guest_count() {
        assert_eq!(extract_guest_count("siamo 3 ospiti"), Some(3));
        assert_eq!(extract_guest_count("per 1 persona"), Some(1));
        assert_eq!(extract_guest_count("camera 12"), None);
    }

    #[test]
    fn test_special_request() {
        assert_eq!(
            extract_special_request("aggiungi \"culla in camera\" alla prenotazione"),
            Some("culla in camera".to_string())
        );
        assert_eq!(
            extract_special_request("Richiesta speciale: un cuscino in più"),
            Some("un cuscino in più".to_string())
        );
        assert_eq!(
            extract_special_request("mi piacerebbe una camera al piano alto"),
            Some("una camera al piano alto".to_string())
        );
        assert_eq!(extract_special_request("richiesta speciale"), None);
    }
}
