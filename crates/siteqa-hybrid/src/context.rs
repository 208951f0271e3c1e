//! Turning retrieved chunks into answer context and a source listing.
use std::collections::HashSet;

use siteqa_core::types::{Chunk, SourceType};

/// Shown when retrieval produced nothing to answer from.
pub const NO_RESULTS_MESSAGE: &str = "I'm sorry, I couldn't find any relevant information.";

/// Number of top chunks the source listing is drawn from.
pub const DEFAULT_SOURCE_LIMIT: usize = 5;

const WEB_PAGE_PREFIX: &str = "www.functiomed.ch_";

/// Chunk contents joined by blank lines, in retrieval order.
pub fn build_context(chunks: &[Chunk]) -> String {
    chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n\n")
}

/// Bilingual source footer built from the first `limit` chunks, one line per
/// distinct source. Empty when none of them carries a usable source.
pub fn format_sources(chunks: &[Chunk], limit: usize) -> String {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for chunk in chunks.iter().take(limit) {
        let (Some(kind), Some(name)) = (chunk.source_type(), chunk.source_name()) else {
            continue;
        };
        if !seen.insert(format!("{}:{name}", kind.as_str())) {
            continue;
        }
        let display = match kind {
            SourceType::Web => web_display_name(name),
            SourceType::Pdf => name.to_string(),
        };
        lines.push(format!("- {display} ({})", kind.as_str().to_uppercase()));
    }
    if lines.is_empty() {
        return String::new();
    }
    format!("\n\nQuellen / Sources:\n{}", lines.join("\n"))
}

/// `www.functiomed.ch_praxis_team` -> `Praxis Team`.
fn web_display_name(page_name: &str) -> String {
    title_case(&page_name.replace(WEB_PAGE_PREFIX, "").replace('_', " "))
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    German,
    English,
}

const GERMAN_MARKERS: &[&str] = &[
    "wie", "ist", "sind", "die", "der", "das", "und", "was", "ich", "haben", "gibt", "welche", "wann", "wo",
    "kann", "nicht", "mit", "für", "öffnungszeiten",
];

impl Language {
    /// Cheap guess at the language of a user question. Umlauts or common
    /// German function words mean German; everything else is English.
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.chars().any(|c| matches!(c, 'ä' | 'ö' | 'ü' | 'ß')) {
            return Language::German;
        }
        let german = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .any(|w| GERMAN_MARKERS.contains(&w));
        if german { Language::German } else { Language::English }
    }

    /// The answer given when the documents do not cover the question.
    pub fn not_found_message(self) -> &'static str {
        match self {
            Language::German => "Diese Information ist in den Dokumenten nicht enthalten.",
            Language::English => "This information is not contained in the provided documents.",
        }
    }
}

/// The single fallback answer for a question the documents do not cover,
/// in the question's language.
pub fn not_found_reply(query: &str) -> &'static str {
    Language::detect(query).not_found_message()
}
