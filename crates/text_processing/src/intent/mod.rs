//! Booking intent detection
//!
//! Classifies a guest message into one booking intent with an ordered list
//! of regex rules evaluated on the lowercased text. The first matching rule
//! wins; there is no scoring.
//!
//! # Example
//!
//! ```
//! use concierge_text_processing::intent::{BookingIntent, BookingIntentMatcher};
//!
//! let matcher = BookingIntentMatcher::new();
//! let detected = matcher.detect("Cancella la prenotazione 65a1b2c3d4e5f60718293a4b");
//!
//! assert_eq!(detected.intent, BookingIntent::Cancel);
//! assert_eq!(detected.booking_id.as_deref(), Some("65a1b2c3d4e5f60718293a4b"));
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extraction::{extract_booking_id, BookingEntities};

/// Booking intent tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookingIntent {
    List,
    Details,
    Cancel,
    Update,
    SpecialRequest,
    CheckAvailability,
    CreateBooking,
    General,
    None,
}

impl BookingIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingIntent::List => "list",
            BookingIntent::Details => "details",
            BookingIntent::Cancel => "cancel",
            BookingIntent::Update => "update",
            BookingIntent::SpecialRequest => "specialRequest",
            BookingIntent::CheckAvailability => "checkAvailability",
            BookingIntent::CreateBooking => "createBooking",
            BookingIntent::General => "general",
            BookingIntent::None => "none",
        }
    }

    /// Intents answered by the booking service rather than the model
    pub fn is_booking_action(&self) -> bool {
        !matches!(self, BookingIntent::General | BookingIntent::None)
    }
}

impl std::fmt::Display for BookingIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of intent detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedBookingIntent {
    pub intent: BookingIntent,
    pub booking_id: Option<String>,
    pub entities: BookingEntities,
}

/// One rule of the cascade
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub intent: BookingIntent,
    pub pattern: Regex,
    /// Only matches when the message carries a booking id
    pub requires_booking_id: bool,
}

impl IntentRule {
    fn new(intent: BookingIntent, pattern: &str, requires_booking_id: bool) -> Self {
        Self {
            intent,
            pattern: Regex::new(pattern).unwrap(),
            requires_booking_id,
        }
    }
}

// Order matters: the first match wins
static DEFAULT_RULES: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    vec![
        IntentRule::new(
            BookingIntent::Cancel,
            r"\b(?:cancell\w*|annull\w*|disdir\w*|disdic\w*|disdett\w*)\b",
            false,
        ),
        IntentRule::new(
            BookingIntent::Update,
            r"\b(?:modific\w*|cambi\w*|spost\w*|aggiorn\w*)\b",
            false,
        ),
        IntentRule::new(
            BookingIntent::SpecialRequest,
            r"richiest\w*\s+special\w*|\baggiung\w*\s+(?:una\s+)?(?:richiest\w*|nota)\b",
            false,
        ),
        IntentRule::new(
            BookingIntent::Details,
            r"\b(?:dettagl\w*|informazion\w*|mostr\w*|visualizz\w*|veder\w*|stato|prenotazion\w*)\b",
            true,
        ),
        IntentRule::new(
            BookingIntent::List,
            r"\b(?:(?:le\s+)?mie\s+prenotazioni|elenc\w*\s+(?:delle\s+)?prenotazioni|lista\s+(?:delle\s+)?prenotazioni|tutte\s+le\s+prenotazioni|prenotazioni\s+attive)\b",
            false,
        ),
        IntentRule::new(
            BookingIntent::CheckAvailability,
            r"\b(?:disponibil\w*|camer[ae]\s+liber[ae]|posto\s+per)\b",
            false,
        ),
        IntentRule::new(
            BookingIntent::CreateBooking,
            r"\b(?:prenot\w*|riserv\w*)\b.*\b(?:camer\w*|stanz\w*|suite|villa|deluxe|standard|soggiorno|nott[ei])\b|\b(?:camer\w*|stanz\w*|suite|villa)\b.*\b(?:prenot\w*|riserv\w*)\b",
            false,
        ),
        IntentRule::new(
            BookingIntent::General,
            r"\b(?:prenot\w*|check[\s-]?in|check[\s-]?out)\b",
            false,
        ),
    ]
});

/// Regex cascade over booking intents
#[derive(Debug, Clone)]
pub struct BookingIntentMatcher {
    rules: Vec<IntentRule>,
}

impl Default for BookingIntentMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingIntentMatcher {
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }

    /// Use a custom rule list (evaluated in order)
    pub fn with_rules(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// Classify a message and pull out the booking entities
    pub fn detect(&self, message: &str) -> DetectedBookingIntent {
        let lowered = message.to_lowercase();
        let booking_id = extract_booking_id(&lowered);

        let intent = self
            .rules
            .iter()
            .find(|rule| {
                (!rule.requires_booking_id || booking_id.is_some())
                    && rule.pattern.is_match(&lowered)
            })
            .map(|rule| rule.intent)
            .unwrap_or(BookingIntent::None);

        tracing::debug!(
            intent = %intent,
            has_booking_id = booking_id.is_some(),
            "Booking intent detected"
        );

        DetectedBookingIntent {
            intent,
            booking_id,
            entities: BookingEntities::from_message(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::RoomType;

    const ID: &str = "65a1b2c3d4e5f60718293a4b";

    fn detect(message: &str) -> BookingIntent {
        BookingIntentMatcher::new().detect(message).intent
    }

    #[test]
    fn test_cancel_with_id() {
        let detected =
            BookingIntentMatcher::new().detect(&format!("cancella la prenotazione {}", ID));
        assert_eq!(detected.intent, BookingIntent::Cancel);
        assert_eq!(detected.booking_id.as_deref(), Some(ID));
    }

    #[test]
    fn test_cancel_without_id() {
        let detected = BookingIntentMatcher::new().detect("Vorrei annullare la mia prenotazione");
        assert_eq!(detected.intent, BookingIntent::Cancel);
        assert!(detected.booking_id.is_none());
    }

    #[test]
    fn test_create_booking_with_entities() {
        let detected = BookingIntentMatcher::new().detect(
            "vorrei prenotare una camera Suite per 2 persone dal 10/07/2024 al 15/07/2024",
        );
        assert_eq!(detected.intent, BookingIntent::CreateBooking);
        assert_eq!(detected.entities.room_type, Some(RoomType::Suite));
        assert_eq!(detected.entities.guests, Some(2));
        assert_eq!(detected.entities.dates.len(), 2);
    }

    #[test]
    fn test_details_requires_id() {
        assert_eq!(
            detect(&format!("mostrami i dettagli della prenotazione {}", ID)),
            BookingIntent::Details
        );
        // Without an id the details rule is skipped and the message falls
        // through to the generic booking rule
        assert_eq!(
            detect("mostrami i dettagli della prenotazione"),
            BookingIntent::General
        );
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(detect("Le mie prenotazioni"), BookingIntent::List);
        assert_eq!(
            detect(&format!("modifica la prenotazione {} al 12/08/2024", ID)),
            BookingIntent::Update
        );
        assert_eq!(
            detect("Richiesta speciale: fiori in camera"),
            BookingIntent::SpecialRequest
        );
        assert_eq!(
            detect("Avete disponibilità per agosto?"),
            BookingIntent::CheckAvailability
        );
        assert_eq!(detect("A che ora è il check-in?"), BookingIntent::General);
        assert_eq!(detect("Cosa c'è nel menu stasera?"), BookingIntent::None);
    }

    #[test]
    fn test_custom_rules() {
        let matcher = BookingIntentMatcher::with_rules(vec![IntentRule::new(
            BookingIntent::List,
            r"\belenco\b",
            false,
        )]);
        assert_eq!(matcher.detect("elenco").intent, BookingIntent::List);
        assert_eq!(matcher.detect("annulla").intent, BookingIntent::None);
    }

    #[test]
    fn test_intent_serialization() {
        let json = serde_json::to_string(&BookingIntent::SpecialRequest).unwrap();
        assert_eq!(json, "\"specialRequest\"");
        assert!(BookingIntent::Cancel.is_booking_action());
        assert!(!BookingIntent::General.is_booking_action());
    }
}
