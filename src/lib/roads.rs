use crate::admin::AdminIndex;
use crate::coord::Coord;
use crate::idstore::{CoordStore, IdStore};
use crate::items::WayNodes;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The 21 county letter codes used on regional road signs.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum County {
    M,
    K,
    I,
    H,
    G,
    N,
    O,
    F,
    E,
    D,
    AB,
    C,
    U,
    T,
    S,
    W,
    X,
    Z,
    Y,
    AC,
    BD,
}

impl County {
    pub const ALL: [County; 21] = [
        County::M,
        County::K,
        County::I,
        County::H,
        County::G,
        County::N,
        County::O,
        County::F,
        County::E,
        County::D,
        County::AB,
        County::C,
        County::U,
        County::T,
        County::S,
        County::W,
        County::X,
        County::Z,
        County::Y,
        County::AC,
        County::BD,
    ];

    pub fn letters(self) -> &'static str {
        match self {
            County::M => "M",
            County::K => "K",
            County::I => "I",
            County::H => "H",
            County::G => "G",
            County::N => "N",
            County::O => "O",
            County::F => "F",
            County::E => "E",
            County::D => "D",
            County::AB => "AB",
            County::C => "C",
            County::U => "U",
            County::T => "T",
            County::S => "S",
            County::W => "W",
            County::X => "X",
            County::Z => "Z",
            County::Y => "Y",
            County::AC => "AC",
            County::BD => "BD",
        }
    }

    /// The county for a lowercased letter code. "e" is absent on purpose:
    /// an E designation is a European road first and resolves to
    /// Östergötland only through [`classify_e_number`].
    pub fn from_letters(letters: &str) -> Option<County> {
        match letters {
            "c" => Some(County::C),
            "d" => Some(County::D),
            "f" => Some(County::F),
            "g" => Some(County::G),
            "h" => Some(County::H),
            "i" => Some(County::I),
            "k" => Some(County::K),
            "m" => Some(County::M),
            "n" => Some(County::N),
            "o" => Some(County::O),
            "s" => Some(County::S),
            "t" => Some(County::T),
            "u" => Some(County::U),
            "w" => Some(County::W),
            "x" => Some(County::X),
            "y" => Some(County::Y),
            "z" => Some(County::Z),
            "ab" => Some(County::AB),
            "ac" => Some(County::AC),
            "bd" => Some(County::BD),
            _ => None,
        }
    }

    /// Map an SCB county (two digits) or municipality (four digits) code to
    /// the road-sign county.
    pub fn from_scb(code: i32) -> Option<County> {
        let county_code = if code >= 100 { code / 100 } else { code };
        match county_code {
            1 => Some(County::AB),
            3 => Some(County::C),
            4 => Some(County::D),
            5 => Some(County::E),
            6 => Some(County::F),
            7 => Some(County::G),
            8 => Some(County::H),
            9 => Some(County::I),
            10 => Some(County::K),
            12 => Some(County::M),
            13 => Some(County::N),
            14 => Some(County::O),
            17 => Some(County::S),
            18 => Some(County::T),
            19 => Some(County::U),
            20 => Some(County::W),
            21 => Some(County::X),
            22 => Some(County::Y),
            23 => Some(County::Z),
            24 => Some(County::AC),
            25 => Some(County::BD),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RoadKind {
    Europe,
    National,
    Regional(County),
    /// A regional-range number seen without a county letter; resolved
    /// later by [`RoadIndex::repair_unlabeled`] or at query time.
    RegionalUnknown,
}

/// A signposted road designation.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Road {
    pub kind: RoadKind,
    pub number: u16,
}

impl Road {
    pub fn new(kind: RoadKind, number: u16) -> Self {
        Road { kind, number }
    }
}

impl fmt::Display for Road {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            RoadKind::Europe => write!(f, "E{}", self.number),
            RoadKind::National => write!(f, "riksväg {}", self.number),
            RoadKind::Regional(county) => write!(f, "{} {}", county.letters(), self.number),
            RoadKind::RegionalUnknown => write!(f, "länsväg {}", self.number),
        }
    }
}

/// Road numbers signposted as European roads in the covered region.
const EUROPEAN_NUMBERS: [u16; 14] = [4, 6, 10, 12, 14, 16, 18, 20, 22, 45, 47, 55, 65, 265];

const EUROPEAN_SLOTS: usize = 30;
const NATIONAL_SLOTS: usize = 500;
const REGIONAL_MAX_NUMBER: u16 = 4096;

/// An `E` followed by a number is a European road if the number exists in
/// the European table; otherwise it is a road in Östergötland (county E).
pub fn classify_e_number(number: u16) -> RoadKind {
    if EUROPEAN_NUMBERS.contains(&number) {
        RoadKind::Europe
    } else {
        RoadKind::Regional(County::E)
    }
}

fn european_index(number: u16) -> Option<usize> {
    if usize::from(number) < 40 && usize::from(number) < EUROPEAN_SLOTS {
        Some(usize::from(number))
    } else if (40..40 + EUROPEAN_SLOTS as u16).contains(&number) {
        Some(usize::from(number - 40))
    } else if number == 265 {
        Some(1)
    } else {
        warn!("cannot map E{} to a storage index", number);
        None
    }
}

/// Ways that carry road refs in the extract but lie outside the covered
/// country, plus a handful of known data errors.
const WAY_BLACKLIST: &[i64] = &[
    1648176, 1648475, 1651992, 2954124, 4605570, 8150233, 23275365, 23444292, 24040916, 24731243,
    24786276, 27872415, 27872417, 27872418, 29054792, 29054793, 30784964, 30887520, 34419027,
    34419029, 38227481, 38564589, 38564590, 44141405, 44298775, 45329454, 45876899, 46931166,
    48386475, 51381476, 51385960, 59065373, 59065380, 59065382, 59065388, 61380105, 67171996,
    69358305, 73854172, 80360747, 116831322, 138003259, 146294832, 180751968, 194028774,
    229700851, 308918468, 308918469, 321318578, 324044848, 324093732, 324271180, 324492881,
    324492887, 326365472, 345614344, 345614345, 347763180, 347763181, 347763182, 347763184,
    347763185, 347763186, 347763188, 366707779, 375573546, 375573548, 383462866, 399732015,
    402989392,
];

/// The nearest node of a road to some coordinate.
#[derive(Clone, Copy, Debug)]
pub struct ClosestRoadNode {
    pub node_id: i64,
    pub distance_m: i64,
    /// The queried road, with `RegionalUnknown` resolved to the county
    /// whose ways supplied the winning node.
    pub road: Road,
}

/// Ways grouped by road designation.
#[derive(Serialize, Deserialize)]
pub struct RoadIndex {
    european: Vec<Vec<i64>>,
    national: Vec<Vec<i64>>,
    regional: FxHashMap<(Option<County>, u16), Vec<i64>>,
}

impl RoadIndex {
    pub fn new() -> Self {
        RoadIndex {
            european: vec![Vec::new(); EUROPEAN_SLOTS],
            national: vec![Vec::new(); NATIONAL_SLOTS],
            regional: FxHashMap::default(),
        }
    }

    /// Parse a `ref` tag value and file the way under every designation it
    /// carries. Multiple designations are separated by `;` or `,`; a `.`
    /// marks a link road ("E4.04"), recorded under its parent number.
    pub fn insert_ref(&mut self, way_id: i64, ref_value: &str) {
        let bytes = ref_value.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            while pos < bytes.len() && bytes[pos] == b' ' {
                pos += 1;
            }
            let letter_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_uppercase() {
                pos += 1;
            }
            let letters = &ref_value[letter_start..pos];
            if !letters.is_empty() {
                // A designation like "E 4" or "AB 123": the letters must be
                // followed by a space and a leading digit.
                if letters.len() > 2
                    || pos >= bytes.len()
                    || bytes[pos] != b' '
                    || pos + 1 >= bytes.len()
                    || !(b'1'..=b'9').contains(&bytes[pos + 1])
                {
                    return;
                }
                pos += 1;
            } else if pos >= bytes.len() || !(b'1'..=b'9').contains(&bytes[pos]) {
                return;
            }

            let digit_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let number: u16 = match ref_value[digit_start..pos].parse() {
                Ok(n) if n > 0 => n,
                _ => return,
            };

            let kind = if letters.is_empty() {
                if number < NATIONAL_SLOTS as u16 {
                    RoadKind::National
                } else {
                    RoadKind::RegionalUnknown
                }
            } else if letters == "E" {
                classify_e_number(number)
            } else {
                match County::from_letters(&letters.to_ascii_lowercase()) {
                    Some(county) => RoadKind::Regional(county),
                    None => {
                        warn!("unknown road letters '{}' in ref '{}'", letters, ref_value);
                        return;
                    }
                }
            };
            self.insert(way_id, Road::new(kind, number));

            match bytes.get(pos) {
                Some(b';') | Some(b',') => pos += 1,
                Some(b'.') => {
                    while pos < bytes.len()
                        && matches!(bytes[pos], b'.' | b';' | b',' | b' ' | b'0'..=b'9')
                    {
                        pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    pub fn insert(&mut self, way_id: i64, road: Road) {
        if WAY_BLACKLIST.contains(&way_id) {
            return;
        }
        // A few ways around Sundsvall carry bogus 53xx numbers.
        if (5300..5400).contains(&road.number)
            && matches!(
                road.kind,
                RoadKind::RegionalUnknown | RoadKind::Regional(County::Y)
            )
        {
            return;
        }
        if way_id == 0 || road.number == 0 || road.number > 9999 {
            warn!("invalid road assignment {} for way {}", road, way_id);
            return;
        }
        match road.kind {
            RoadKind::Europe => {
                if let Some(idx) = european_index(road.number) {
                    self.european[idx].push(way_id);
                }
            }
            RoadKind::National => {
                if usize::from(road.number) < NATIONAL_SLOTS {
                    self.national[usize::from(road.number)].push(way_id);
                } else {
                    warn!(
                        "road number {} needs a county letter, way {}",
                        road.number, way_id
                    );
                }
            }
            RoadKind::Regional(county) => {
                self.regional_entry(Some(county), road.number, way_id);
            }
            RoadKind::RegionalUnknown => {
                self.regional_entry(None, road.number, way_id);
            }
        }
    }

    fn regional_entry(&mut self, county: Option<County>, number: u16, way_id: i64) {
        if number >= REGIONAL_MAX_NUMBER {
            warn!("regional road number {} out of range, way {}", number, way_id);
            return;
        }
        self.regional.entry((county, number)).or_default().push(way_id);
    }

    /// All ways filed under a designation.
    pub fn ways_for(&self, road: Road) -> &[i64] {
        static EMPTY: [i64; 0] = [];
        match road.kind {
            RoadKind::Europe => european_index(road.number)
                .map(|idx| self.european[idx].as_slice())
                .unwrap_or(&EMPTY),
            RoadKind::National => {
                if usize::from(road.number) < NATIONAL_SLOTS {
                    self.national[usize::from(road.number)].as_slice()
                } else {
                    &EMPTY
                }
            }
            RoadKind::Regional(county) => self
                .regional
                .get(&(Some(county), road.number))
                .map(Vec::as_slice)
                .unwrap_or(&EMPTY),
            RoadKind::RegionalUnknown => self
                .regional
                .get(&(None, road.number))
                .map(Vec::as_slice)
                .unwrap_or(&EMPTY),
        }
    }

    /// The node of the given road closest to `coord`. A `RegionalUnknown`
    /// road searches every county bucket with that number and reports the
    /// county whose ways supplied the winner.
    pub fn closest_road_node(
        &self,
        coord: Coord,
        road: Road,
        way_nodes: &IdStore<WayNodes>,
        coords: &CoordStore,
    ) -> Option<ClosestRoadNode> {
        if road.number == 0 {
            return None;
        }
        let buckets: Vec<(RoadKind, &[i64])> = match road.kind {
            RoadKind::RegionalUnknown => {
                let mut buckets: Vec<(RoadKind, &[i64])> = County::ALL
                    .iter()
                    .filter_map(|&county| {
                        self.regional
                            .get(&(Some(county), road.number))
                            .map(|ways| (RoadKind::Regional(county), ways.as_slice()))
                    })
                    .collect();
                if let Some(ways) = self.regional.get(&(None, road.number)) {
                    buckets.push((RoadKind::RegionalUnknown, ways.as_slice()));
                }
                buckets
            }
            kind => vec![(kind, self.ways_for(road))],
        };

        let mut best: Option<(i64, i64, RoadKind)> = None;
        for (kind, ways) in buckets {
            for &way_id in ways {
                if let Some((node_id, dist_sq)) = closest_way_node(coord, way_id, way_nodes, coords)
                {
                    if best.map_or(true, |(_, best_sq, _)| dist_sq < best_sq) {
                        best = Some((node_id, dist_sq, kind));
                    }
                }
            }
        }
        best.map(|(node_id, dist_sq, kind)| {
            let distance_m = (dist_sq as f64).sqrt().round() as i64;
            debug!(
                "closest node of {} to ({}, {}) is {} at {} m",
                road, coord.x, coord.y, node_id, distance_m
            );
            ClosestRoadNode {
                node_id,
                distance_m,
                road: Road::new(kind, road.number),
            }
        })
    }

    /// Move unlabelled regional ways into their county bucket when exactly
    /// one SCB municipality contains the way's middle node.
    pub fn repair_unlabeled(
        &mut self,
        admin: &AdminIndex,
        way_nodes: &IdStore<WayNodes>,
        coords: &CoordStore,
    ) {
        let numbers: Vec<u16> = self
            .regional
            .keys()
            .filter(|(county, _)| county.is_none())
            .map(|&(_, number)| number)
            .collect();
        for number in numbers {
            let ways = match self.regional.remove(&(None, number)) {
                Some(ways) => ways,
                None => continue,
            };
            let mut unresolved = Vec::new();
            for way_id in ways {
                let county = way_nodes
                    .get(way_id)
                    .and_then(|nodes| nodes.get(nodes.len() / 2))
                    .and_then(|&node| coords.get(node))
                    .map(|coord| admin.scb_codes_containing(coord))
                    .filter(|codes| codes.len() == 1)
                    .and_then(|codes| County::from_scb(codes[0]));
                match county {
                    Some(county) => {
                        debug!("assigning county {} to way {} (road {})", county.letters(), way_id, number);
                        self.regional
                            .entry((Some(county), number))
                            .or_default()
                            .push(way_id);
                    }
                    None => unresolved.push(way_id),
                }
            }
            if !unresolved.is_empty() {
                self.regional.insert((None, number), unresolved);
            }
        }
    }
}

impl Default for RoadIndex {
    fn default() -> Self {
        RoadIndex::new()
    }
}

fn closest_way_node(
    coord: Coord,
    way_id: i64,
    way_nodes: &IdStore<WayNodes>,
    coords: &CoordStore,
) -> Option<(i64, i64)> {
    let nodes = way_nodes.get(way_id)?;
    nodes
        .iter()
        .filter_map(|&node| coords.get(node).map(|c| (node, Coord::grid_distance_sq(coord, c))))
        .min_by_key(|&(_, dist_sq)| dist_sq)
}

/// Words that announce a road number in running Swedish text.
const ROAD_WORDS: &[&str] = &[
    "rv",
    "väg",
    "vägen",
    "riksväg",
    "riksvägen",
    "länsväg",
    "länsvägen",
];

fn leading_number(word: &str) -> Option<u16> {
    let digits: String = word.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok().filter(|&n| n > 0)
}


fn is_letter_code(word: &str) -> bool {
    let b = word.as_bytes();
    (b.len() == 1 && b[0].is_ascii_lowercase())
        || (b.len() == 2
            && (b'a'..=b'b').contains(&b[0])
            && (b'a'..=b'd').contains(&b[1]))
}

fn kind_for_letters(letters: &str, number: u16) -> Option<RoadKind> {
    if letters == "e" {
        Some(classify_e_number(number))
    } else {
        County::from_letters(letters).map(RoadKind::Regional)
    }
}

/// Scan the raw (lowercased) token list for road designations: a county
/// letter next to or fused with a number ("e4", "e 4", "ab 123"), or a
/// Swedish road word followed by a number ("riksväg 40").
pub fn identify_roads(words: &[String]) -> Vec<Road> {
    let mut roads: Vec<Road> = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let next = words.get(i + 1);
        let bytes = word.as_bytes();

        let next_starts_with_digit =
            next.map_or(false, |n| matches!(n.as_bytes().first(), Some(b'1'..=b'9')));
        let candidate = if is_letter_code(word) && next_starts_with_digit {
            next.and_then(|n| leading_number(n))
                .and_then(|number| kind_for_letters(word, number).map(|kind| Road::new(kind, number)))
        } else if bytes.len() >= 2 && bytes[0].is_ascii_lowercase() && (b'1'..=b'9').contains(&bytes[1])
        {
            leading_number(&word[1..]).filter(|&n| n < 9999).and_then(|number| {
                kind_for_letters(&word[..1], number).map(|kind| Road::new(kind, number))
            })
        } else if bytes.len() >= 3
            && (b'a'..=b'b').contains(&bytes[0])
            && (b'a'..=b'd').contains(&bytes[1])
            && (b'1'..=b'9').contains(&bytes[2])
        {
            leading_number(&word[2..]).and_then(|number| {
                kind_for_letters(&word[..2], number).map(|kind| Road::new(kind, number))
            })
        } else if ROAD_WORDS.contains(&word.as_str()) && next_starts_with_digit {
            next.and_then(|n| leading_number(n)).map(|number| {
                let kind = if number < NATIONAL_SLOTS as u16 {
                    RoadKind::National
                } else {
                    RoadKind::RegionalUnknown
                };
                Road::new(kind, number)
            })
        } else {
            None
        };

        if let Some(road) = candidate {
            if !roads.contains(&road) {
                roads.push(road);
            }
        }
    }
    roads
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn e_numbers_split_between_europe_and_ostergotland() {
        assert_eq!(classify_e_number(4), RoadKind::Europe);
        assert_eq!(classify_e_number(45), RoadKind::Europe);
        assert_eq!(classify_e_number(265), RoadKind::Europe);
        assert_eq!(classify_e_number(123), RoadKind::Regional(County::E));
    }

    #[test]
    fn ref_parsing_files_ways_under_each_designation() {
        let mut index = RoadIndex::new();
        index.insert_ref(100, "E 4;E 20");
        assert_eq!(index.ways_for(Road::new(RoadKind::Europe, 4)), &[100]);
        assert_eq!(index.ways_for(Road::new(RoadKind::Europe, 20)), &[100]);

        index.insert_ref(101, "M 625");
        assert_eq!(
            index.ways_for(Road::new(RoadKind::Regional(County::M), 625)),
            &[101]
        );

        index.insert_ref(102, "40");
        assert_eq!(index.ways_for(Road::new(RoadKind::National, 40)), &[102]);

        // No county letter and number in the regional range.
        index.insert_ref(103, "573");
        assert_eq!(
            index.ways_for(Road::new(RoadKind::RegionalUnknown, 573)),
            &[103]
        );
    }

    #[test]
    fn link_roads_record_the_parent_number() {
        let mut index = RoadIndex::new();
        index.insert_ref(104, "E 4.04");
        assert_eq!(index.ways_for(Road::new(RoadKind::Europe, 4)), &[104]);
    }

    #[test]
    fn blacklisted_ways_are_dropped() {
        let mut index = RoadIndex::new();
        index.insert_ref(1648176, "E 4");
        assert!(index.ways_for(Road::new(RoadKind::Europe, 4)).is_empty());
    }

    #[test]
    fn identifies_roads_in_token_lists() {
        assert_eq!(
            identify_roads(&words(&["e4", "nära", "jönköping"])),
            vec![Road::new(RoadKind::Europe, 4)]
        );
        assert_eq!(
            identify_roads(&words(&["e", "4"])),
            vec![Road::new(RoadKind::Europe, 4)]
        );
        assert_eq!(
            identify_roads(&words(&["riksväg", "40", "mellan", "borås"])),
            vec![Road::new(RoadKind::National, 40)]
        );
        assert_eq!(
            identify_roads(&words(&["länsväg", "573"])),
            vec![Road::new(RoadKind::RegionalUnknown, 573)]
        );
        assert_eq!(
            identify_roads(&words(&["m625"])),
            vec![Road::new(RoadKind::Regional(County::M), 625)]
        );
        assert!(identify_roads(&words(&["jönköping"])).is_empty());
    }

    #[test]
    fn duplicate_designations_are_reported_once() {
        let roads = identify_roads(&words(&["e4", "och", "e", "4"]));
        assert_eq!(roads, vec![Road::new(RoadKind::Europe, 4)]);
    }

    #[test]
    fn closest_node_resolves_unknown_county() {
        let mut coords = CoordStore::new();
        coords.insert(1, Coord::new(1_000, 1_000));
        coords.insert(2, Coord::new(2_000, 1_000));
        coords.insert(3, Coord::new(90_000, 90_000));

        let mut way_nodes = IdStore::new();
        way_nodes.insert(10, vec![1, 2]);
        way_nodes.insert(11, vec![3]);

        let mut index = RoadIndex::new();
        index.insert(10, Road::new(RoadKind::Regional(County::O), 573));
        index.insert(11, Road::new(RoadKind::Regional(County::AB), 573));

        let hit = index
            .closest_road_node(
                Coord::new(1_900, 1_100),
                Road::new(RoadKind::RegionalUnknown, 573),
                &way_nodes,
                &coords,
            )
            .expect("closest node");
        assert_eq!(hit.node_id, 2);
        assert_eq!(hit.road.kind, RoadKind::Regional(County::O));
    }

    #[test]
    fn scb_codes_map_to_counties() {
        assert_eq!(County::from_scb(1480), Some(County::O));
        assert_eq!(County::from_scb(3), Some(County::C));
        assert_eq!(County::from_scb(9999), None);
    }
}
