//! Canonicalization of Vietnamese place names.
//!
//! Raw place names arrive with inconsistent administrative prefixes
//! ("Tỉnh Hà Nội" vs "ha noi"), mixed case, stray punctuation, and — because
//! of input-method differences — tone marks typed on different vowels of the
//! same diphthong ("hoà" vs "hòa"). Lookups against the reference mapping
//! only work after every spelling of a name collapses to one canonical form:
//!
//! 1. [`normalize_place()`] strips one leading administrative prefix and one
//!    trailing English suffix, removes bracket/dash punctuation, collapses
//!    whitespace, drops leading zeros, and lower-cases.
//! 2. [`normalize_tone_marks()`] re-derives the canonical tone-mark position
//!    for every syllable.
//! 3. [`canonical()`] chains both and trims; [`normalize_key()`] applies it
//!    componentwise to build a [`CanonicalKey`].

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Normalized (province, district, ward) triple used for reference lookups.
///
/// Equality is exact string equality after normalization; empty components
/// are legal and common (reference rows do not always carry all three).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CanonicalKey {
    pub province: String,
    pub district: String,
    pub ward: String,
}

/// Vietnamese administrative prefixes plus English forms, checked in order;
/// the first match wins and only one prefix is ever removed. Order matters:
/// "tp." must be tried before "tp".
const PLACE_PREFIXES: &[&str] = &[
    "tp.",
    "tx.",
    "tt.",
    "q.",
    "x.",
    "p.",
    "t.",
    "h.",
    "thành phố",
    "tỉnh",
    "tp",
    "thủ đô",
    "td",
    "huyện",
    "quận",
    "thị xã",
    "xã",
    "phường",
    "thị trấn",
    "district of",
    "dist of",
    "county of",
    "town of",
    "ward of",
    "commune of",
    "township of",
];

/// Trailing English administrative suffixes; first match wins, one removal.
const PLACE_SUFFIXES: &[&str] = &[
    "province",
    "prov",
    "district",
    "dist",
    "county",
    "town",
    "ward",
    "commune",
    "township",
];

/// The 12 Vietnamese vowels with their six tone forms, indexed by tone class:
/// 0 = none, 1 = huyền, 2 = sắc, 3 = hỏi, 4 = ngã, 5 = nặng.
const VOWEL_TONE_FORMS: [(char, [char; 6]); 12] = [
    ('a', ['a', 'à', 'á', 'ả', 'ã', 'ạ']),
    ('ă', ['ă', 'ằ', 'ắ', 'ẳ', 'ẵ', 'ặ']),
    ('â', ['â', 'ầ', 'ấ', 'ẩ', 'ẫ', 'ậ']),
    ('e', ['e', 'è', 'é', 'ẻ', 'ẽ', 'ẹ']),
    ('ê', ['ê', 'ề', 'ế', 'ể', 'ễ', 'ệ']),
    ('i', ['i', 'ì', 'í', 'ỉ', 'ĩ', 'ị']),
    ('o', ['o', 'ò', 'ó', 'ỏ', 'õ', 'ọ']),
    ('ô', ['ô', 'ồ', 'ố', 'ổ', 'ỗ', 'ộ']),
    ('ơ', ['ơ', 'ờ', 'ớ', 'ở', 'ỡ', 'ợ']),
    ('u', ['u', 'ù', 'ú', 'ủ', 'ũ', 'ụ']),
    ('ư', ['ư', 'ừ', 'ứ', 'ử', 'ữ', 'ự']),
    ('y', ['y', 'ỳ', 'ý', 'ỷ', 'ỹ', 'ỵ']),
];

/// Vowels that carry a quality diacritic; when present in a cluster, the tone
/// mark always lands on one of these.
const MODIFIED_VOWELS: [char; 6] = ['ê', 'ơ', 'â', 'ă', 'ô', 'ư'];

fn tone_forms(base: char) -> Option<&'static [char; 6]> {
    VOWEL_TONE_FORMS
        .iter()
        .find(|(b, _)| *b == base)
        .map(|(_, forms)| forms)
}

/// Looks up a single NFC-composed character cluster: returns the base vowel
/// and its tone class, or `None` for consonants and punctuation.
fn base_and_tone(cluster: &str) -> Option<(char, usize)> {
    let lowered: String = cluster.to_lowercase().nfc().collect();
    let mut chars = lowered.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    for (base, forms) in &VOWEL_TONE_FORMS {
        if let Some(idx) = forms.iter().position(|form| *form == ch) {
            return Some((*base, idx));
        }
    }
    None
}

/// Splits a syllable into NFC clusters, attaching combining marks to their
/// base letter so "hoà" becomes `["h", "o", "à"]` regardless of whether the
/// input was precomposed.
fn decompose_syllable(syllable: &str) -> Vec<String> {
    let mut clusters = Vec::new();
    let mut current = String::new();
    for ch in syllable.nfd() {
        if is_combining_mark(ch) {
            current.push(ch);
        } else {
            if !current.is_empty() {
                clusters.push(current.as_str().nfc().collect());
            }
            current = ch.to_string();
        }
    }
    if !current.is_empty() {
        clusters.push(current.as_str().nfc().collect());
    }
    clusters
}

/// Re-applies the syllable's tone mark (if any) to the canonical vowel.
///
/// Placement rule, applied to the syllable's vowel cluster:
/// 1. a quality-modified vowel (ê ơ â ă ô ư) always takes the mark;
/// 2. a single vowel takes it;
/// 3. of two vowels, the second takes it when the first is "u" or "i",
///    otherwise the first;
/// 4. of three vowels, the middle one takes it.
///
/// Syllables without a tone mark pass through (NFC-composed); leading
/// capitalization is preserved.
fn normalize_syllable(syllable: &str) -> String {
    if syllable.is_empty() {
        return String::new();
    }
    let mut clusters = decompose_syllable(syllable);
    let mut vowel_positions: Vec<usize> = Vec::new();
    let mut base_vowels: Vec<char> = Vec::new();
    let mut tone_index = 0usize;

    for (idx, cluster) in clusters.iter_mut().enumerate() {
        if let Some((base, tone)) = base_and_tone(cluster) {
            vowel_positions.push(idx);
            base_vowels.push(base);
            if tone != 0 {
                tone_index = tone;
            }
            // Park the vowel in its toneless lowercase form for now.
            if let Some(forms) = tone_forms(base) {
                *cluster = forms[0].to_string();
            }
        }
    }

    if vowel_positions.is_empty() {
        return syllable.to_string();
    }
    if tone_index == 0 {
        return syllable.nfc().collect();
    }

    let (target_pos, target_base) = vowel_positions
        .iter()
        .zip(&base_vowels)
        .find(|(_, base)| MODIFIED_VOWELS.contains(base))
        .map(|(pos, base)| (*pos, *base))
        .unwrap_or_else(|| match vowel_positions.len() {
            1 => (vowel_positions[0], base_vowels[0]),
            2 => {
                if matches!(base_vowels[0], 'u' | 'i') {
                    (vowel_positions[1], base_vowels[1])
                } else {
                    (vowel_positions[0], base_vowels[0])
                }
            }
            _ => (vowel_positions[1], base_vowels[1]),
        });

    if let Some(forms) = tone_forms(target_base) {
        clusters[target_pos] = forms[tone_index].to_string();
    }

    let result = clusters.concat();
    if syllable.chars().next().is_some_and(char::is_uppercase) {
        capitalize(&result)
    } else {
        result
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+|\W+").expect("static token pattern"))
}

/// Re-derives canonical tone-mark placement for every syllable in `text`,
/// leaving punctuation, whitespace, and capitalization untouched.
///
/// Idempotent: a second application is a no-op.
pub fn normalize_tone_marks(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for token in token_regex().find_iter(text) {
        let token = token.as_str();
        let is_word = token
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if is_word {
            normalized.push_str(&normalize_syllable(token));
        } else {
            normalized.push_str(token);
        }
    }
    normalized
}

fn punct_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[,()\[\]\-+]+").expect("static punctuation pattern"))
}

fn trailing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.,/\s]+$").expect("static trailing pattern"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static whitespace pattern"))
}

/// Strips one administrative prefix, one English suffix, punctuation, excess
/// whitespace, and leading zeros from a raw place name, lower-casing it.
pub fn normalize_place(raw: &str) -> String {
    let mut name = raw.trim().to_lowercase();
    if name.is_empty() {
        return name;
    }

    for prefix in PLACE_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest.trim_start().to_string();
            break;
        }
    }
    for suffix in PLACE_SUFFIXES {
        if let Some(rest) = name.strip_suffix(suffix) {
            name = rest.trim_end().to_string();
            break;
        }
    }

    let name = punct_regex().replace_all(&name, " ");
    let name = trailing_regex().replace_all(&name, "");
    let name = whitespace_regex().replace_all(&name, " ");
    name.trim().trim_start_matches('0').trim().to_string()
}

/// Full canonical form of a single place-name component: prefix/suffix
/// stripping, tone-mark repositioning, trim, lower-case.
pub fn canonical(raw: &str) -> String {
    normalize_tone_marks(&normalize_place(raw))
        .trim()
        .to_lowercase()
}

/// Builds the canonical (province, district, ward) lookup key for a row or a
/// reference record.
pub fn normalize_key(province: &str, district: &str, ward: &str) -> CanonicalKey {
    CanonicalKey {
        province: canonical(province),
        district: canonical(district),
        ward: canonical(ward),
    }
}
