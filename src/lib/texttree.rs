use crate::items::OsmElement;
use crate::tokenizer::{self, Multiplicity};
use log::warn;
use serde::{Deserialize, Serialize};

/// Size of the trie alphabet: a-z, 0-9, six Swedish/loan letters, hyphen,
/// the word separator, and a catch-all for anything else.
pub const ALPHABET_SIZE: usize = 48;
const CODE_HYPHEN: u8 = 45;
const CODE_WORD_SEP: u8 = ALPHABET_SIZE as u8 - 2;
const CODE_UNKNOWN: u8 = ALPHABET_SIZE as u8 - 1;

/// Map one (already lowercased) byte to its trie code. `prev` carries the
/// preceding byte so two-byte UTF-8 letters can be recognized.
fn code_char(prev: u8, c: u8) -> u8 {
    if c == 0 {
        0
    } else if c.is_ascii_lowercase() {
        c - b'a' + 1 // 1..26
    } else if c.is_ascii_digit() {
        c - b'0' + 27 // 27..36
    } else if prev == 0xC3 {
        match c {
            0xA5 => 37, // å
            0xA4 => 38, // ä
            0xB6 => 39, // ö
            0xA9 => 40, // é
            0xBC => 41, // ü
            0xB8 => 42, // ø
            _ => CODE_UNKNOWN,
        }
    } else if c <= 0x20 {
        CODE_WORD_SEP
    } else if c < 0x7F {
        if c == b'-' {
            CODE_HYPHEN
        } else {
            CODE_UNKNOWN
        }
    } else {
        CODE_UNKNOWN
    }
}

/// Encode a folded word into a trie code sequence. The 0xC3 lead byte is
/// consumed silently; control characters end the word.
fn encode(word: &str) -> Vec<u8> {
    let mut codes = Vec::with_capacity(word.len());
    let mut prev: u8 = 0;
    for &c in word.as_bytes() {
        if c < 0x20 {
            warn!("control character while encoding search key");
            break;
        }
        if c == 0xC3 {
            prev = c;
            continue;
        }
        codes.push(code_char(prev, c));
        prev = c;
    }
    codes
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct TextNode {
    /// Empty for leaves; allocated to `ALPHABET_SIZE` slots on the first
    /// child insertion.
    children: Vec<Option<Box<TextNode>>>,
    elements: Vec<OsmElement>,
}

/// Character-code trie mapping folded names (and their word suffixes) to
/// the OSM elements carrying that name.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TextTree {
    root: TextNode,
    size: usize,
}

impl TextTree {
    pub fn new() -> Self {
        TextTree::default()
    }

    /// Number of (key, element) pairs stored.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Insert a name for an element. The name is folded and split into
    /// words; every window of the three largest lengths (n, n-1, n-2) is
    /// inserted as a space-joined key, so "Stora Hotellet Fjällbacka" is
    /// findable via "hotellet fjällbacka" as well.
    pub fn insert(&mut self, name: &str, element: OsmElement) -> bool {
        let folded = tokenizer::fold_lower(name);
        let mut words = Vec::new();
        tokenizer::split_words(&folded, Multiplicity::Duplicates, &mut words);
        if words.is_empty() {
            return false;
        }
        let n = words.len();
        let shortest = n.saturating_sub(2).max(1);
        for s in (shortest..=n).rev() {
            for window in words.windows(s) {
                self.insert_key(&window.join(" "), element);
            }
        }
        true
    }

    fn insert_key(&mut self, key: &str, element: OsmElement) {
        let codes = encode(key);
        if codes.is_empty() {
            return;
        }
        let mut cur = &mut self.root;
        for &code in &codes {
            if cur.children.is_empty() {
                cur.children.resize_with(ALPHABET_SIZE, || None);
            }
            cur = &mut **cur.children[code as usize].get_or_insert_with(Box::default);
        }
        // The same element may carry the same name under several tags;
        // a leaf lists it once.
        if !cur.elements.contains(&element) {
            cur.elements.push(element);
            self.size += 1;
        }
    }

    /// All elements stored under the given (folded or unfolded) key, or an
    /// empty list if any prefix of the key is absent.
    pub fn retrieve(&self, query: &str) -> Vec<OsmElement> {
        let folded = tokenizer::fold_lower(query);
        let codes = encode(&folded);
        let mut cur = &self.root;
        for &code in &codes {
            match cur.children.get(code as usize) {
                Some(Some(child)) => cur = &**child,
                _ => return Vec::new(),
            }
        }
        cur.elements.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{Category, ElementKind};

    fn place(id: i64) -> OsmElement {
        OsmElement::new(id, ElementKind::Node, Category::PlaceMedium)
    }

    #[test]
    fn retrieves_inserted_names() {
        let mut tree = TextTree::new();
        tree.insert("Uppsala", place(1));
        assert_eq!(tree.retrieve("uppsala"), vec![place(1)]);
        assert_eq!(tree.retrieve("Uppsala"), vec![place(1)]);
        assert!(tree.retrieve("uppsal").is_empty());
        assert!(tree.retrieve("falun").is_empty());
    }

    #[test]
    fn swedish_letters_have_their_own_codes() {
        let mut tree = TextTree::new();
        tree.insert("Växjö", place(1));
        tree.insert("Vaxjo", place(2));
        assert_eq!(tree.retrieve("växjö"), vec![place(1)]);
        assert_eq!(tree.retrieve("vaxjo"), vec![place(2)]);
    }

    #[test]
    fn multi_word_names_expose_suffix_windows() {
        let mut tree = TextTree::new();
        tree.insert("Stora Hotellet Fjällbacka", place(7));
        assert_eq!(tree.retrieve("stora hotellet fjällbacka"), vec![place(7)]);
        assert_eq!(tree.retrieve("hotellet fjällbacka"), vec![place(7)]);
        assert_eq!(tree.retrieve("fjällbacka"), vec![place(7)]);
        assert_eq!(tree.retrieve("stora hotellet"), vec![place(7)]);
    }

    #[test]
    fn leaves_deduplicate_elements() {
        let mut tree = TextTree::new();
        tree.insert("Mora", place(3));
        tree.insert("Mora", place(3));
        assert_eq!(tree.retrieve("mora").len(), 1);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn same_name_can_map_to_many_elements() {
        let mut tree = TextTree::new();
        tree.insert("Kungsgatan", place(10));
        tree.insert("Kungsgatan", place(11));
        let hits = tree.retrieve("kungsgatan");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn hyphenated_names_round_trip() {
        let mut tree = TextTree::new();
        tree.insert("Sankt Anna-Ön", place(4));
        assert_eq!(tree.retrieve("sankt anna-ön"), vec![place(4)]);
    }

    #[test]
    fn unsupported_sequences_do_not_crash() {
        let mut tree = TextTree::new();
        tree.insert("Café 北京", place(5));
        assert!(!tree.retrieve("café").is_empty());
    }
}
