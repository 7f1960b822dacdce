//! HTML rendering of formatted replies

use std::fmt::Write;

use html_escape::encode_safe;

use super::{FormattedItem, FormattedMessage, FormattedSection};

pub(super) fn render_html(message: &FormattedMessage) -> String {
    if !message.has_sections() {
        return message
            .intro
            .as_deref()
            .map(paragraph)
            .unwrap_or_default();
    }

    let mut html = String::from("<div class=\"formatted-message\">");

    if let Some(intro) = &message.intro {
        html.push_str(&paragraph(intro));
    }

    for section in &message.sections {
        render_section(&mut html, section);
    }

    if let Some(outro) = &message.outro {
        html.push_str(&paragraph(outro));
    }

    html.push_str("</div>");
    html
}

fn paragraph(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| encode_safe(line.trim()).into_owned())
        .collect();
    format!("<p>{}</p>", lines.join("<br>"))
}

fn render_section(html: &mut String, section: &FormattedSection) {
    let _ = write!(
        html,
        "<section class=\"card-section {kind}-section\"><h3>{title}</h3><div class=\"cards\">",
        kind = section.kind.as_str(),
        title = encode_safe(&section.title),
    );
    for item in &section.items {
        render_item(html, item, section.kind.as_str());
    }
    html.push_str("</div></section>");
}

fn render_item(html: &mut String, item: &FormattedItem, kind: &str) {
    let _ = write!(
        html,
        "<div class=\"card {kind}-card\"><div class=\"card-header\"><span class=\"card-name\">{}</span>",
        encode_safe(&item.name),
    );
    if let Some(price) = &item.price {
        let _ = write!(html, "<span class=\"card-price\">{}</span>", encode_safe(price));
    }
    html.push_str("</div>");
    if let Some(date) = &item.date {
        let _ = write!(html, "<div class=\"card-date\">{}</div>", encode_safe(date));
    }
    if let Some(description) = &item.description {
        let _ = write!(
            html,
            "<p class=\"card-description\">{}</p>",
            encode_safe(description)
        );
    }
    html.push_str("</div>");
}

#[cfg(test)]
mod tests {
    use crate::formatter::MessageFormatter;

    #[test]
    fn test_render_cards() {
        let html = MessageFormatter::new()
            .format("Ecco a lei:\nANTIPASTI: Bruschetta (pomodoro e basilico) €8. Tagliere €12")
            .to_html();

        assert!(html.starts_with("<div class=\"formatted-message\">"));
        assert!(html.contains("<p>Ecco a lei:</p>"));
        assert!(html.contains("<h3>ANTIPASTI</h3>"));
        assert!(html.contains("<span class=\"card-name\">Bruschetta</span>"));
        assert!(html.contains("<span class=\"card-price\">€8</span>"));
        assert!(html.contains("<p class=\"card-description\">pomodoro e basilico</p>"));
        assert_eq!(html.matches("menu-card").count(), 2);
    }

    #[test]
    fn test_plain_text_is_escaped() {
        let html = MessageFormatter::new()
            .format("Orari <b>spa\n9 & 19")
            .to_html();
        assert_eq!(html, "<p>Orari &lt;b&gt;spa<br>9 &amp; 19</p>");
    }

    #[test]
    fn test_item_text_is_escaped() {
        let html = MessageFormatter::new()
            .format("DOLCI: Torta <script> €5")
            .to_html();
        assert!(html.contains("Torta &lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
