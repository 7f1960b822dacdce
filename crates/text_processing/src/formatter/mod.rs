//! Reply formatting
//!
//! Splits free-form model replies into sections introduced by fixed
//! uppercase headers (`ANTIPASTI:`, `ESCURSIONI:`, `EVENTI:` ...), then each
//! section body into items with name, description, price and date.
//!
//! The splitting is a best-effort heuristic. When no header is found, or no
//! section yields an item, the whole text is kept as one paragraph.

mod render;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of card section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Menu,
    Activity,
    Event,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Menu => "menu",
            SectionKind::Activity => "activity",
            SectionKind::Event => "event",
        }
    }

    fn from_header(header: &str) -> Self {
        if EVENT_HEADERS.contains(&header) {
            SectionKind::Event
        } else if ACTIVITY_HEADERS.contains(&header) {
            SectionKind::Activity
        } else {
            SectionKind::Menu
        }
    }
}

// Longer alternatives first so `PRIMI PIATTI` wins over `PRIMI`
const MENU_HEADERS: &[&str] = &[
    "PRIMI PIATTI",
    "SECONDI PIATTI",
    "ANTIPASTI",
    "PRIMI",
    "SECONDI",
    "CONTORNI",
    "DOLCI",
    "DESSERT",
    "BEVANDE",
    "VINI",
    "PIZZE",
];

const ACTIVITY_HEADERS: &[&str] = &[
    "ATTIVITÀ",
    "ATTIVITA",
    "ESCURSIONI",
    "SPORT",
    "BENESSERE",
    "SPA",
    "TOUR",
];

const EVENT_HEADERS: &[&str] = &["EVENTI", "CONCERTI", "SPETTACOLI", "SERATE"];

static HEADER: Lazy<Regex> = Lazy::new(|| {
    let names: Vec<&str> = MENU_HEADERS
        .iter()
        .chain(ACTIVITY_HEADERS)
        .chain(EVENT_HEADERS)
        .copied()
        .collect();
    Regex::new(&format!(
        r"(?:\*\*|#+[ \t]*)?\b({})[ \t]*:(?:\*\*)?",
        names.join("|")
    ))
    .unwrap()
});

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.;!]\s+").unwrap());

static PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)€\s*(\d+(?:[.,]\d{1,2})?)|(\d+(?:[.,]\d{1,2})?)\s*(?:€|euro\b)").unwrap()
});

static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+").unwrap());

static NUMBERED_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)\d{1,2}[.)]\s+").unwrap());

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]*)\)").unwrap());

static EVENT_DATE: Lazy<Regex> = Lazy::new(|| {
    let weekday = r"(?:lunedì|lunedi|martedì|martedi|mercoledì|mercoledi|giovedì|giovedi|venerdì|venerdi|sabato|domenica)";
    let month = r"(?:gennaio|febbraio|marzo|aprile|maggio|giugno|luglio|agosto|settembre|ottobre|novembre|dicembre)";
    Regex::new(&format!(
        r"(?i)\b(?:ogni\s+{wd}|{wd}(?:\s+\d{{1,2}}(?:\s+{m})?)?|\d{{1,2}}\s+{m}|stasera|domani|questo\s+weekend)\b",
        wd = weekday,
        m = month
    ))
    .unwrap()
});

/// One card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormattedItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Normalised as `€<amount>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Header plus its cards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedSection {
    pub kind: SectionKind,
    pub title: String,
    pub items: Vec<FormattedItem>,
}

/// Parsed reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormattedMessage {
    /// Text before the first header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    pub sections: Vec<FormattedSection>,
    /// Closing paragraph after the last section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outro: Option<String>,
}

impl FormattedMessage {
    /// Plain paragraph with no cards
    pub fn plain(text: &str) -> Self {
        let text = text.trim();
        Self {
            intro: (!text.is_empty()).then(|| text.to_string()),
            sections: Vec::new(),
            outro: None,
        }
    }

    pub fn has_sections(&self) -> bool {
        !self.sections.is_empty()
    }

    /// Render as HTML; all text is escaped
    pub fn to_html(&self) -> String {
        render::render_html(self)
    }
}

/// Stateless reply formatter
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFormatter;

impl MessageFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, text: &str) -> FormattedMessage {
        let headers: Vec<(usize, usize, &str)> = HEADER
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?.as_str();
                Some((whole.start(), whole.end(), name))
            })
            .collect();

        if headers.is_empty() {
            return FormattedMessage::plain(text);
        }

        let intro = clean_paragraph(&text[..headers[0].0]);
        let mut sections = Vec::new();
        let mut outro = None;

        for (i, &(_, body_start, name)) in headers.iter().enumerate() {
            let is_last = i + 1 == headers.len();
            let body_end = headers.get(i + 1).map(|h| h.0).unwrap_or(text.len());
            let mut body = &text[body_start..body_end];

            // A blank line after the last section closes the list
            if is_last {
                if let Some(pos) = find_blank_line(body.trim_start()) {
                    let trimmed = body.trim_start();
                    outro = clean_paragraph(&trimmed[pos..]);
                    body = &trimmed[..pos];
                }
            }

            let kind = SectionKind::from_header(name);
            let items: Vec<FormattedItem> = split_items(body)
                .into_iter()
                .filter_map(|raw| parse_item(&raw, kind))
                .collect();

            if items.is_empty() {
                tracing::debug!(header = name, "Section without items dropped");
                continue;
            }

            sections.push(FormattedSection {
                kind,
                title: name.to_string(),
                items,
            });
        }

        if sections.is_empty() {
            return FormattedMessage::plain(text);
        }

        FormattedMessage {
            intro,
            sections,
            outro,
        }
    }
}

fn find_blank_line(text: &str) -> Option<usize> {
    text.find("\n\n")
        .or_else(|| text.find("\r\n\r\n"))
        .filter(|pos| !text[..*pos].trim().is_empty())
}

fn clean_paragraph(text: &str) -> Option<String> {
    let cleaned = text.trim().trim_matches('*').trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Split a section body into raw item strings
///
/// Tries, in order: inline list numbers on a one-line numbered list, lines or
/// sentence terminators, price positions, a comma before a capitalised word.
/// The first strategy producing more than one piece is used; otherwise the
/// body is a single item.
fn split_items(body: &str) -> Vec<String> {
    let body = body.trim();
    if body.is_empty() {
        return Vec::new();
    }

    let strategies: [fn(&str) -> Vec<String>; 4] = [
        split_on_list_numbers,
        split_on_terminators,
        split_after_prices,
        split_on_capitalised_comma,
    ];

    for strategy in strategies {
        let pieces = non_empty(strategy(body));
        if pieces.len() > 1 {
            return pieces;
        }
    }

    non_empty(vec![body.to_string()])
}

fn non_empty(pieces: Vec<String>) -> Vec<String> {
    pieces
        .into_iter()
        .map(|p| BULLET.replace(p.trim(), "").trim().to_string())
        .filter(|p| !p.is_empty() && !p.chars().all(|c| c.is_ascii_digit() || ".)".contains(c)))
        .collect()
}

/// "1. Tiramisù 2. Panna cotta" on one line; multi-line lists split by line
fn split_on_list_numbers(body: &str) -> Vec<String> {
    let one_line = body.lines().filter(|l| !l.trim().is_empty()).count() == 1;
    let numbered = BULLET
        .find(body)
        .is_some_and(|m| m.as_str().trim_start().starts_with(|c: char| c.is_ascii_digit()));
    if !(one_line && numbered) {
        return vec![body.to_string()];
    }
    NUMBERED_MARKER.split(body).map(str::to_string).collect()
}

fn split_on_terminators(body: &str) -> Vec<String> {
    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() > 1 {
        return lines.into_iter().map(str::to_string).collect();
    }
    SENTENCE_END.split(body).map(str::to_string).collect()
}

fn split_after_prices(body: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for m in PRICE.find_iter(body) {
        pieces.push(body[start..m.end()].to_string());
        start = m.end();
    }
    if start < body.len() {
        pieces.push(body[start..].to_string());
    }
    pieces
}

fn split_on_capitalised_comma(body: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, c) in body.char_indices() {
        if c != ',' {
            continue;
        }
        let rest = &body[idx + 1..];
        let after_space = rest.trim_start();
        let had_space = after_space.len() < rest.len();
        if had_space && after_space.chars().next().map(char::is_uppercase).unwrap_or(false) {
            pieces.push(body[start..idx].to_string());
            start = idx + 1;
        }
    }
    pieces.push(body[start..].to_string());
    pieces
}

/// Parse one raw item; `None` when nothing nameable is left
fn parse_item(raw: &str, kind: SectionKind) -> Option<FormattedItem> {
    let mut rest = raw.trim().trim_end_matches(['.', ';', '!']).to_string();

    let price = PRICE.captures(&rest).map(|caps| {
        let amount = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
        format!("€{}", amount)
    });
    rest = PRICE.replace_all(&rest, "").to_string();

    let date = if kind == SectionKind::Event {
        let found = EVENT_DATE.find(&rest).map(|m| m.as_str().to_string());
        rest = EVENT_DATE.replace_all(&rest, "").to_string();
        found
    } else {
        None
    };

    let mut description = PARENTHETICAL
        .captures(&rest)
        .map(|caps| caps[1].trim().to_string())
        .filter(|d| !d.is_empty());
    rest = PARENTHETICAL.replace_all(&rest, "").to_string();

    if description.is_none() {
        let split = [", ", " - ", " – "]
            .iter()
            .filter_map(|sep| rest.find(sep).map(|pos| (pos, sep.len())))
            .min_by_key(|(pos, _)| *pos);
        if let Some((pos, len)) = split {
            let tail = tidy(&rest[pos + len..]);
            if !tail.is_empty() {
                description = Some(tail);
            }
            rest.truncate(pos);
        }
    }

    let name = tidy(&rest);
    if name.is_empty() && description.is_none() {
        return None;
    }

    Some(FormattedItem {
        name,
        description,
        price,
        date,
    })
}

fn tidy(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || ":,;.-–*".contains(c))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(text: &str) -> FormattedMessage {
        MessageFormatter::new().format(text)
    }

    #[test]
    fn test_menu_section_two_items() {
        let message = format("ANTIPASTI: Bruschetta (pomodoro e basilico) €8. Tagliere €12");
        assert_eq!(message.sections.len(), 1);

        let section = &message.sections[0];
        assert_eq!(section.kind, SectionKind::Menu);
        assert_eq!(section.title, "ANTIPASTI");
        assert_eq!(section.items.len(), 2);

        assert_eq!(section.items[0].name, "Bruschetta");
        assert_eq!(
            section.items[0].description.as_deref(),
            Some("pomodoro e basilico")
        );
        assert_eq!(section.items[0].price.as_deref(), Some("€8"));
        assert_eq!(section.items[1].name, "Tagliere");
        assert_eq!(section.items[1].price.as_deref(), Some("€12"));
    }

    #[test]
    fn test_intro_multiple_sections_and_outro() {
        let text = "Ecco il nostro menu di stasera:\n\
                    PRIMI PIATTI:\n\
                    - Spaghetti alle vongole, con prezzemolo fresco €16\n\
                    - Risotto ai funghi €14\n\
                    DOLCI:\n\
                    1. Tiramisù €7\n\
                    2. Panna cotta €6\n\
                    \n\
                    Buon appetito!";
        let message = format(text);

        assert_eq!(message.intro.as_deref(), Some("Ecco il nostro menu di stasera:"));
        assert_eq!(message.sections.len(), 2);
        assert_eq!(message.sections[0].title, "PRIMI PIATTI");

        let first = &message.sections[0].items[0];
        assert_eq!(first.name, "Spaghetti alle vongole");
        assert_eq!(first.description.as_deref(), Some("con prezzemolo fresco"));
        assert_eq!(first.price.as_deref(), Some("€16"));

        assert_eq!(message.sections[1].items.len(), 2);
        assert_eq!(message.sections[1].items[0].name, "Tiramisù");
        assert_eq!(message.outro.as_deref(), Some("Buon appetito!"));
    }

    #[test]
    fn test_split_after_prices() {
        let message = format("PIZZE: Margherita 8 euro Diavola 10,50 €");
        let items = &message.sections[0].items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Margherita");
        assert_eq!(items[0].price.as_deref(), Some("€8"));
        assert_eq!(items[1].name, "Diavola");
        assert_eq!(items[1].price.as_deref(), Some("€10,50"));
    }

    #[test]
    fn test_one_line_numbered_list() {
        let message = format("DOLCI: 1. Tiramisù €6 2. Panna cotta €5 3) Cannoli");
        let items = &message.sections[0].items;
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Tiramisù", "Panna cotta", "Cannoli"]);
        assert_eq!(items[0].price.as_deref(), Some("€6"));
        assert_eq!(items[1].price.as_deref(), Some("€5"));

        let message = format("DOLCI: 1. Tiramisù 2. Panna cotta");
        let names: Vec<&str> = message.sections[0].items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Tiramisù", "Panna cotta"]);
    }

    #[test]
    fn test_split_on_capitalised_comma() {
        let message = format("ESCURSIONI: Giro in barca alle grotte, Trekking sul Monte, Visita in cantina");
        let section = &message.sections[0];
        assert_eq!(section.kind, SectionKind::Activity);
        let names: Vec<&str> = section.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Giro in barca alle grotte", "Trekking sul Monte", "Visita in cantina"]
        );
    }

    #[test]
    fn test_event_dates() {
        let message = format("EVENTI: Serata jazz ogni venerdì (in terrazza). Degustazione vini 15 agosto €25.");
        let items = &message.sections[0].items;
        assert_eq!(message.sections[0].kind, SectionKind::Event);
        assert_eq!(items[0].name, "Serata jazz");
        assert_eq!(items[0].date.as_deref(), Some("ogni venerdì"));
        assert_eq!(items[0].description.as_deref(), Some("in terrazza"));
        assert_eq!(items[1].date.as_deref(), Some("15 agosto"));
        assert_eq!(items[1].price.as_deref(), Some("€25"));
    }

    #[test]
    fn test_no_headers_is_plain() {
        let message = format("Il ristorante apre alle 19:30. Prenoti pure!");
        assert!(!message.has_sections());
        assert_eq!(
            message.intro.as_deref(),
            Some("Il ristorante apre alle 19:30. Prenoti pure!")
        );
    }

    #[test]
    fn test_lowercase_header_not_detected() {
        let message = format("antipasti: bruschetta €8");
        assert!(!message.has_sections());
    }

    #[test]
    fn test_empty_section_falls_back() {
        let message = format("DOLCI:");
        assert!(!message.has_sections());
        assert_eq!(message.intro.as_deref(), Some("DOLCI:"));
    }
}
