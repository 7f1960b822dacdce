//! Prompt templates
//!
//! The system prompt is rebuilt for every request from the current knowledge
//! base so that edits (e.g. new restaurant hours) are visible immediately.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::knowledge::{KnowledgeBase, ACTIVITIES, EVENTS, RESTAURANT, SERVICES};

/// Prompt templates configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// Agent role description
    pub role: String,
    /// Assistant name shown to guests
    pub assistant_name: String,
    /// Hotel name
    pub hotel_name: String,
    /// Behavior guidelines
    pub guidelines: Vec<String>,
    /// Section headers the reply should use for lists
    #[serde(default)]
    pub formatting: FormattingGuide,
    /// Reply used when no language model is available
    pub fallback_message: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            role: "Sei il concierge digitale dell'hotel. Rispondi alle domande degli ospiti \
                   su ristorante, attività, eventi e servizi."
                .to_string(),
            assistant_name: "Concierge".to_string(),
            hotel_name: "Hotel".to_string(),
            guidelines: vec![
                "Rispondi sempre in italiano, con tono cordiale e professionale".to_string(),
                "Usa solo le informazioni fornite qui sotto".to_string(),
                "Se un'informazione non è disponibile, invita l'ospite a contattare la reception"
                    .to_string(),
                "Mantieni le risposte brevi e concrete".to_string(),
            ],
            formatting: FormattingGuide::default(),
            fallback_message: "Mi dispiace, al momento non riesco a rispondere. \
                               Per assistenza immediata contatta la reception."
                .to_string(),
        }
    }
}

/// Instructions that keep list replies parseable by the message formatter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattingGuide {
    pub menu_headers: Vec<String>,
    pub activity_headers: Vec<String>,
    pub event_headers: Vec<String>,
}

impl Default for FormattingGuide {
    fn default() -> Self {
        Self {
            menu_headers: ["ANTIPASTI", "PRIMI", "SECONDI", "CONTORNI", "DOLCI", "BEVANDE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            activity_headers: ["ATTIVITÀ", "ESCURSIONI", "BENESSERE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            event_headers: ["EVENTI"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FormattingGuide {
    fn build(&self) -> String {
        let mut text = String::from("\n## Formato delle risposte\n");
        text.push_str(
            "- Quando elenchi piatti, attività o eventi, apri ogni gruppo con un'intestazione \
             in maiuscolo seguita da due punti, ad esempio `ANTIPASTI:`\n",
        );
        text.push_str(&format!(
            "- Intestazioni per il menu: {}\n",
            self.menu_headers.join(", ")
        ));
        text.push_str(&format!(
            "- Intestazioni per le attività: {}\n",
            self.activity_headers.join(", ")
        ));
        text.push_str(&format!(
            "- Intestazioni per gli eventi: {}\n",
            self.event_headers.join(", ")
        ));
        text.push_str(
            "- Ogni voce termina con un punto e riporta il prezzo in euro (es. €8), \
             la descrizione tra parentesi\n",
        );
        text
    }
}

impl PromptTemplates {
    /// Build the system prompt from the current knowledge base
    pub fn build_system_prompt(&self, kb: &KnowledgeBase) -> String {
        let mut prompt = format!(
            "{}\n\nTi chiami {} e lavori per {}.\n\n",
            self.role, self.assistant_name, self.hotel_name
        );

        prompt.push_str("## Linee guida\n");
        for guideline in &self.guidelines {
            prompt.push_str(&format!("- {}\n", guideline));
        }

        prompt.push_str(&self.formatting.build());

        let sections = [
            (RESTAURANT, "Ristorante"),
            (ACTIVITIES, "Attività"),
            (EVENTS, "Eventi"),
            (SERVICES, "Servizi"),
        ];
        for (key, title) in sections {
            if let Some(value) = kb.category(key) {
                push_data_section(&mut prompt, title, value);
            }
        }

        // Any extra categories dropped in the data directory
        for name in kb.categories() {
            if sections.iter().any(|(key, _)| *key == name) {
                continue;
            }
            if let Some(value) = kb.category(&name) {
                push_data_section(&mut prompt, &name, value);
            }
        }

        prompt
    }
}

fn push_data_section(prompt: &mut String, title: &str, value: &Value) {
    let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    prompt.push_str(&format!("\n## {}\n```json\n{}\n```\n", title, body));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_prompt_includes_knowledge() {
        let mut kb = KnowledgeBase::new();
        kb.insert("restaurant", json!({"name": "La Terrazza", "hours": "19:30-22:30"}));
        kb.insert("spiaggia", json!({"ombrelloni": 40}));

        let templates = PromptTemplates {
            hotel_name: "Hotel Miramare".to_string(),
            ..Default::default()
        };
        let prompt = templates.build_system_prompt(&kb);

        assert!(prompt.contains("Hotel Miramare"));
        assert!(prompt.contains("## Ristorante"));
        assert!(prompt.contains("La Terrazza"));
        assert!(prompt.contains("## spiaggia"));
        assert!(!prompt.contains("## Eventi"));
        assert!(prompt.contains("ANTIPASTI"));
    }

    #[test]
    fn test_empty_knowledge_base() {
        let prompt = PromptTemplates::default().build_system_prompt(&KnowledgeBase::new());
        assert!(prompt.contains("## Linee guida"));
        assert!(!prompt.contains("```json"));
    }
}
