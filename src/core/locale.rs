//! Localized vocabulary.
//!
//! The portal is served in several languages. Instead of inline case-folding
//! expressions, every concept the automation must recognise by text is
//! listed here with its keyword variants, and recognised through
//! [`matches_concept`].

use aho_corasick::AhoCorasick;
use std::sync::OnceLock;

/// Things the automation recognises by visible text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concept {
    /// Heading of the "make an appointment" section.
    Appointment,
    /// Wording of an anti-automation challenge prompt.
    ChallengePrompt,
    /// Affirmative label of a challenge's "proceed" control.
    ChallengeProceed,
}

/// Keyword variants per concept. Keywords are stored lower-case; matching is
/// substring based so inflected forms share a stem.
const VOCABULARY: &[(Concept, &[&str])] = &[
    (
        Concept::Appointment,
        &[
            // English
            "appointment",
            // Polish: "wizyta", "wizytę", "umów wizytę"
            "wizyt",
            "umów",
            // Ukrainian: "запис на прийом", "візит"
            "запис",
            "прийом",
            "візит",
            // Russian: "запись на приём", "визит"
            "запись",
            "приём",
            "прием",
            "визит",
        ],
    ),
    (
        Concept::ChallengePrompt,
        &[
            // English
            "verify you are human",
            "i'm not a robot",
            "i am not a robot",
            "are you a robot",
            "press and hold",
            // Polish
            "nie jestem robotem",
            "potwierdź, że jesteś człowiekiem",
            "potwierdz, ze jestes czlowiekiem",
            "czy jesteś robotem",
        ],
    ),
    (
        Concept::ChallengeProceed,
        &["proceed", "continue", "przejdź", "kontynuuj", "dalej"],
    ),
];

/// Keyword variants registered for `concept`.
pub fn keywords(concept: Concept) -> &'static [&'static str] {
    VOCABULARY
        .iter()
        .find(|(c, _)| *c == concept)
        .map(|(_, words)| *words)
        .unwrap_or(&[])
}

fn matcher(concept: Concept) -> &'static AhoCorasick {
    static APPOINTMENT: OnceLock<AhoCorasick> = OnceLock::new();
    static CHALLENGE: OnceLock<AhoCorasick> = OnceLock::new();
    static PROCEED: OnceLock<AhoCorasick> = OnceLock::new();
    let cell = match concept {
        Concept::Appointment => &APPOINTMENT,
        Concept::ChallengePrompt => &CHALLENGE,
        Concept::ChallengeProceed => &PROCEED,
    };
    cell.get_or_init(|| AhoCorasick::new(keywords(concept)).expect("valid vocabulary patterns"))
}

/// Unicode case folding plus whitespace collapsing.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Returns `true` when the normalized `text` contains any keyword of `concept`.
pub fn matches_concept(concept: Concept, text: &str) -> bool {
    let normalized = normalize(text);
    !normalized.is_empty() && matcher(concept).is_match(&normalized)
}

/// Month abbreviations as rendered by the portal's calendar header, mapped to
/// month numbers. Polish is the portal default; English covers the English UI.
const MONTH_ABBREVIATIONS: &[(&str, u32)] = &[
    ("STY", 1),
    ("LUT", 2),
    ("MAR", 3),
    ("KWI", 4),
    ("MAJ", 5),
    ("CZE", 6),
    ("LIP", 7),
    ("SIE", 8),
    ("WRZ", 9),
    ("PAŹ", 10),
    ("LIS", 11),
    ("GRU", 12),
    ("JAN", 1),
    ("FEB", 2),
    ("APR", 4),
    ("MAY", 5),
    ("JUN", 6),
    ("JUL", 7),
    ("AUG", 8),
    ("SEP", 9),
    ("OCT", 10),
    ("NOV", 11),
    ("DEC", 12),
];

/// Maps a localized month abbreviation (any case, trailing dot allowed) to
/// its month number.
pub fn month_number(abbreviation: &str) -> Option<u32> {
    let key = abbreviation.trim().trim_end_matches('.').to_uppercase();
    MONTH_ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == key)
        .map(|(_, month)| *month)
}
