//! Response segmentation for tutor replies.
//!
//! The model is asked to answer in bracketed regions:
//!
//! ```text
//! [CHAT_RESPONSE]
//! ...
//! [STUDY_PLAN]
//! 1. ...
//! [FLASHCARDS]
//! Tarjeta 1:
//! Nota: ...
//! Recordar: ...
//! ```
//!
//! A region body runs from its marker to the next `[` or the end of input.
//! Regions may come in any order or be missing, and unknown markers are left
//! as literal text. Parsing never fails: a reply that ignores the format is
//! still shown in the chat with its tags stripped.

use crate::mode::Mode;
use crate::models::{Flashcard, ParsedTutorResponse};

const MAX_STUDY_PLAN_STEPS: usize = 3;
const MAX_FLASHCARDS: usize = 3;

const CARD_LABEL: &str = "Tarjeta ";
const NOTE_LABEL: &str = "nota:";
const RECALL_LABEL: &str = "recordar:";
const LEGACY_QUESTION_LABEL: &str = "Pregunta:";
const LEGACY_ANSWER_LABEL: &str = "Respuesta:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Chat,
    StudyPlan,
    SidebarResources,
    Flashcards,
}

/// Recognized marker names. Matching is exact and case-sensitive.
const REGION_MARKERS: [(&str, Region); 4] = [
    ("CHAT_RESPONSE", Region::Chat),
    ("STUDY_PLAN", Region::StudyPlan),
    ("SIDEBAR_RESOURCES", Region::SidebarResources),
    ("FLASHCARDS", Region::Flashcards),
];

impl Region {
    fn from_marker(name: &str) -> Option<Self> {
        REGION_MARKERS
            .iter()
            .find(|(marker, _)| *marker == name)
            .map(|(_, region)| *region)
    }
}

/// Region bodies found in one reply. The first occurrence of a marker wins.
#[derive(Debug, Default)]
struct Regions<'a> {
    chat: Option<&'a str>,
    study_plan: Option<&'a str>,
    sidebar_resources: Option<&'a str>,
    flashcards: Option<&'a str>,
}

impl<'a> Regions<'a> {
    fn scan(raw: &'a str) -> Self {
        let mut regions = Self::default();
        let mut cursor = 0;

        while let Some(offset) = raw[cursor..].find('[') {
            let name_start = cursor + offset + 1;
            let Some(close) = raw[name_start..].find(']') else {
                break;
            };
            let name_end = name_start + close;

            match Region::from_marker(&raw[name_start..name_end]) {
                Some(region) => {
                    let body_start = name_end + 1;
                    let body_end = raw[body_start..]
                        .find('[')
                        .map_or(raw.len(), |i| body_start + i);
                    let slot = regions.slot(region);
                    if slot.is_none() {
                        *slot = Some(&raw[body_start..body_end]);
                    }
                    cursor = body_end;
                }
                None => cursor = name_start,
            }
        }

        regions
    }

    fn slot(&mut self, region: Region) -> &mut Option<&'a str> {
        match region {
            Region::Chat => &mut self.chat,
            Region::StudyPlan => &mut self.study_plan,
            Region::SidebarResources => &mut self.sidebar_resources,
            Region::Flashcards => &mut self.flashcards,
        }
    }
}

/// Split a raw model reply into its panels.
///
/// `study_plan` and `sidebar_resources` are `None` when their region is
/// absent so the caller can keep its previous value. Flashcards are empty in
/// evaluation mode or when the region is absent.
pub fn parse(raw: &str, mode: Mode) -> ParsedTutorResponse {
    let regions = Regions::scan(raw);

    let chat_text = match regions.chat {
        Some(body) => body.trim().to_string(),
        None => strip_tags(raw),
    };

    let flashcards = match regions.flashcards {
        Some(body) if mode.allows_flashcards() => parse_flashcards(body),
        _ => Vec::new(),
    };

    ParsedTutorResponse {
        chat_text,
        study_plan: regions
            .study_plan
            .map(|body| list_items(body, Some(MAX_STUDY_PLAN_STEPS))),
        sidebar_resources: regions.sidebar_resources.map(|body| list_items(body, None)),
        flashcards,
    }
}

/// Remove every single-line `[...]` tag and trim.
fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        match after.find(|c: char| c == ']' || c == '\n') {
            Some(end) if after[end..].starts_with(']') => {
                out.push_str(&rest[..open]);
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}

/// One entry per non-blank line, list markers removed.
fn list_items(body: &str, limit: Option<usize>) -> Vec<String> {
    body.lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .take(limit.unwrap_or(usize::MAX))
        .map(str::to_string)
        .collect()
}

/// Strip leading bullets, dashes, arrows and `N.` numbering.
fn strip_list_marker(line: &str) -> &str {
    let mut rest = line.trim();
    loop {
        if let Some(stripped) = rest.strip_prefix(['•', '-', '*', '>']) {
            rest = stripped.trim_start();
            continue;
        }
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            if let Some(stripped) = rest[digits..].strip_prefix('.') {
                rest = stripped.trim_start();
                continue;
            }
        }
        return rest.trim_end();
    }
}

fn parse_flashcards(body: &str) -> Vec<Flashcard> {
    let mut cards: Vec<Flashcard> = split_cards(body)
        .into_iter()
        .filter_map(card_from_fragment)
        .collect();

    if cards.is_empty() {
        cards = legacy_cards(body);
    }

    cards.truncate(MAX_FLASHCARDS);
    cards
}

/// Split on `Tarjeta <n>:` labels, dropping blank fragments.
fn split_cards(body: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut search = 0;

    while let Some(offset) = body[search..].find(CARD_LABEL) {
        let label = search + offset;
        let digits_start = label + CARD_LABEL.len();
        let digits = body[digits_start..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        let colon = digits_start + digits;

        if digits > 0 && body[colon..].starts_with(':') {
            fragments.push(&body[start..label]);
            start = colon + 1;
            search = start;
        } else {
            search = digits_start;
        }
    }
    fragments.push(&body[start..]);

    fragments
        .into_iter()
        .filter(|fragment| !fragment.trim().is_empty())
        .collect()
}

/// `Nota:` up to `Recordar:` is the question, the rest is the answer.
/// Labels match case-insensitively.
fn card_from_fragment(fragment: &str) -> Option<Flashcard> {
    // ASCII lowercasing keeps byte offsets aligned with `fragment`.
    let lower = fragment.to_ascii_lowercase();
    let note = lower.find(NOTE_LABEL)?;
    let recall = lower.find(RECALL_LABEL)?;

    let question_start = note + NOTE_LABEL.len();
    let question_end = lower[question_start..]
        .find(RECALL_LABEL)
        .map_or(fragment.len(), |i| question_start + i);

    Some(Flashcard {
        question: fragment[question_start..question_end].trim().to_string(),
        answer: fragment[recall + RECALL_LABEL.len()..].trim().to_string(),
    })
}

/// Older reply shape: alternating `Pregunta:` / `Respuesta:` lines paired by
/// position. A trailing unpaired line is dropped.
fn legacy_cards(body: &str) -> Vec<Flashcard> {
    let lines: Vec<&str> = body
        .lines()
        .filter(|line| line.contains(LEGACY_QUESTION_LABEL) || line.contains(LEGACY_ANSWER_LABEL))
        .collect();

    lines
        .chunks_exact(2)
        .map(|pair| Flashcard {
            question: pair[0].replacen(LEGACY_QUESTION_LABEL, "", 1).trim().to_string(),
            answer: pair[1].replacen(LEGACY_ANSWER_LABEL, "", 1).trim().to_string(),
        })
        .collect()
}
