use crate::error::Result;
use itertools::Itertools;
use log::warn;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Characters that separate words.
const GAP: &[u8] = b" ?!\"'#%*&()=,;._\n\r\t/";

/// Words that frequently occur inside place names but are too unspecific to
/// search for on their own.
const MEANINGLESS_ALONE: &[&str] = &[
    "ny", "nya", "nytt", "gammal", "gamla", "gammalt",
    "västra", "östra", "norra", "södra",
    "väster", "öster", "norr", "söder",
    "inre", "yttre", "lilla", "stora", "nästa", "förre",
    "vita", "gröna", "röda", "blåa", "svarta",
    "pappa", "mamma", "son", "dotter",
    "bil", "bo", "bron", "bruk", "både", "by",
    "center", "centrala", "centrum", "city",
    "dahl", "daglig",
    "gård", "göta",
    "hamn", "halv", "hitta", "hos", "hus", "höjd",
    "kl", "km", "kommun", "kyrka", "län",
    "män", "nära",
    "plats", "platsen", "pris",
    "region", "regionens", "runt", "rör",
    "sankt", "s:t", "ser", "slott", "spår", "stad", "staden", "station",
    "svea", "sverige", "såg",
    "tf", "tid", "tillfällig", "torg", "torget",
    "vi", "via", "väg", "vägen",
    "år", "ö", "ön",
];

/// Definite forms whose final letter must not be trimmed on its own
/// ("året" would become the place name "Åre").
const KEEP_FINAL_LETTER: &[&str] = &["året", "åren"];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Multiplicity {
    Duplicates,
    Unique,
}

fn fold_byte(prev: u8, c: u8) -> u8 {
    if c.is_ascii_uppercase() || (prev == 0xC3 && (0x80..=0x9E).contains(&c) && c != 0x97) {
        // ASCII and Latin-1-supplement upper case differ from lower case
        // only in bit 0x20 (excluding the multiplication sign).
        c | 0x20
    } else if (prev == 0xC4 && (0x80..=0xB7).contains(&c))
        || (prev == 0xC5 && (0x8A..=0xBE).contains(&c))
    {
        // Latin-Extended-A rows alternate upper/lower in bit 0x01.
        c | 0x01
    } else {
        c
    }
}

/// Rewrite a combining diacritical mark (0xCC 0x8x) following a plain
/// letter into the pre-composed two-byte form.
fn collapse_combining_mark(bytes: &mut Vec<u8>, i: usize) {
    if i == 0 || i + 1 >= bytes.len() {
        return;
    }
    let mark = bytes[i + 1];
    let base = bytes[i - 1];
    let composed: Option<[u8; 2]> = match mark {
        0x81 => match base {
            b'e' => Some([0xC3, 0xA9]),
            b'E' => Some([0xC3, 0x89]),
            _ => None,
        },
        0x88 => match base {
            b'a' => Some([0xC3, 0xA4]),
            b'A' => Some([0xC3, 0x84]),
            b'o' => Some([0xC3, 0xB6]),
            b'O' => Some([0xC3, 0x96]),
            _ => None,
        },
        0x8A => match base {
            b'a' => Some([0xC3, 0xA5]),
            b'A' => Some([0xC3, 0x85]),
            _ => None,
        },
        _ => None,
    };
    if let Some([lead, tail]) = composed {
        bytes[i - 1] = lead;
        bytes[i] = tail;
        bytes.remove(i + 1);
    }
}

/// Lowercase a string with the folding rules the name index uses: ASCII and
/// Latin-1 case bits, Latin-Extended-A case bits, combining diacritical
/// marks collapsed onto their pre-composed forms, and the spacing acute
/// accent (0xC2 0xB4) turned into an apostrophe.
pub fn fold_lower(text: &str) -> String {
    let mut bytes = text.as_bytes().to_vec();
    let mut prev: u8 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if i > 0 && c == 0xCC {
            collapse_combining_mark(&mut bytes, i);
            prev = bytes[i];
        } else if c == 0xC2 {
            if i + 1 < bytes.len() && bytes[i + 1] == 0xB4 {
                bytes[i] = b'\'';
                bytes.remove(i + 1);
            }
            prev = bytes[i];
        } else {
            let folded = fold_byte(prev, c);
            bytes[i] = folded;
            prev = folded;
        }
        i += 1;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Split an already folded line into words on the gap set. Two-byte UTF-8
/// sequences starting with 0xC3 are kept intact; any other multi-byte
/// sequence is dropped with a warning.
pub fn split_words(line: &str, multiplicity: Multiplicity, words: &mut Vec<String>) {
    let bytes = line.as_bytes();
    let mut known: HashSet<Vec<u8>> = HashSet::new();
    let mut word: Vec<u8> = Vec::new();
    let mut prev: u8 = 0;

    let mut flush = |word: &mut Vec<u8>, known: &mut HashSet<Vec<u8>>| {
        if word.is_empty() {
            return;
        }
        let keep = match multiplicity {
            Multiplicity::Duplicates => true,
            Multiplicity::Unique => known.insert(word.clone()),
        };
        if keep {
            words.push(String::from_utf8_lossy(word).into_owned());
        }
        word.clear();
    };

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c & 0xE0 == 0xE0 {
            // Sequence of three or more bytes; the alphabet does not cover
            // these, so skip the whole sequence.
            let len = if c & 0xF8 == 0xF0 { 4 } else { 3 };
            warn!("skipping unsupported UTF-8 sequence of {} bytes", len);
            i += len;
            prev = 0;
            continue;
        }
        if prev & 0xE0 == 0xC0 && (prev != 0xC3 || !(0x80..=0xBF).contains(&c)) {
            // Two-byte sequence outside the supported 0xC3 row; the lead
            // byte is already in the word, take it back out.
            warn!("skipping unsupported UTF-8 character {:#04x} {:#04x}", prev, c);
            word.pop();
            prev = 0;
            i += 1;
            continue;
        }
        if prev & 0xE0 == 0xC0 || !GAP.contains(&c) {
            word.push(c);
            prev = c;
        } else {
            flush(&mut word, &mut known);
            prev = 0;
        }
        i += 1;
    }
    flush(&mut word, &mut known);
}

fn is_single_ascii_symbol(word: &str) -> bool {
    if word.len() != 1 {
        return false;
    }
    let c = word.as_bytes()[0];
    (0x21..=0x2F).contains(&c)
        || (0x3A..=0x40).contains(&c)
        || (0x5B..=0x60).contains(&c)
        || (0x7B..=0x7E).contains(&c)
}

fn is_number(word: &str) -> bool {
    !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit())
}

/// Heuristic alternates for Swedish noun forms: definite endings lose their
/// suffix ("travbanan" → "travbana", "biblioteket" → "bibliotek") and a
/// trailing genitive s is dropped ("Karlsborgs" → "Karlsborg").
fn grammar_cases(word: &str) -> Vec<String> {
    let mut cases = Vec::new();
    let len = word.len();
    if len <= 4 {
        return cases;
    }
    let bytes = word.as_bytes();
    let last = bytes[len - 1];
    let second_last = bytes[len - 2];
    if (last == b't' || last == b'n') && (second_last == b'a' || second_last == b'e') {
        if !KEEP_FINAL_LETTER.contains(&word) {
            cases.push(word[..len - 1].to_string());
        }
        cases.push(word[..len - 2].to_string());
    } else if last == b's' {
        cases.push(word[..len - 1].to_string());
    }
    cases
}

/// Splits query text into search words and builds the word combinations the
/// matchers look up.
pub struct Tokenizer {
    stopwords: Vec<String>,
}

impl Tokenizer {
    /// Load the stop-word list, one word per line, `#` starts a comment.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let words = content
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_string())
            .collect();
        Ok(Tokenizer::from_words(words))
    }

    pub fn from_words(mut stopwords: Vec<String>) -> Self {
        stopwords.sort();
        Tokenizer { stopwords }
    }

    fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.binary_search_by(|s| s.as_str().cmp(word)).is_ok()
    }

    /// Lowercase and split free-form text into tokens, dropping stop words
    /// and single-character ASCII symbols. Lines starting with `#` are
    /// ignored.
    pub fn read_words(&self, text: &str, multiplicity: Multiplicity) -> Vec<String> {
        let mut words = Vec::new();
        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            split_words(&fold_lower(line), multiplicity, &mut words);
        }
        words.retain(|word| !self.is_stopword(word) && !is_single_ascii_symbol(word));
        words
    }

    /// Sliding-window combinations of up to `max_len` words, with grammar
    /// alternates generated for the final word of each window. Pure numbers
    /// and single a-z letters never enter a combination, and single-word
    /// combinations are filtered against the meaningless-alone list.
    pub fn word_combinations(&self, words: &[String], max_len: usize) -> Vec<String> {
        let mut combinations = Vec::new();

        let alternatives: Vec<(String, Vec<String>)> = words
            .iter()
            .filter(|word| {
                let bytes = word.as_bytes();
                !(bytes.len() == 1 && bytes[0].is_ascii_lowercase()) && !is_number(word)
            })
            .map(|word| (word.clone(), grammar_cases(word)))
            .collect();
        if alternatives.is_empty() {
            return combinations;
        }

        let upper = max_len.max(1).min(alternatives.len());
        for s in (1..=upper).rev() {
            for window in alternatives.windows(s) {
                let mut prefix = String::new();
                for (base, _) in &window[..s - 1] {
                    prefix.push_str(base);
                    prefix.push(' ');
                }
                let (last_base, last_cases) = &window[s - 1];
                for last in std::iter::once(last_base).chain(last_cases.iter()) {
                    if s == 1 && MEANINGLESS_ALONE.contains(&last.as_str()) {
                        continue;
                    }
                    combinations.push(format!("{}{}", prefix, last));
                }
            }
        }
        combinations.into_iter().unique().collect()
    }
}
