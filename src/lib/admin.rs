use crate::coord::Coord;
use crate::idstore::{CoordStore, IdStore};
use crate::items::{ElementKind, OsmElement, WayNodes};
use crate::tokenizer;
use log::{info, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::VecDeque;

pub const ROLE_OUTER: u8 = 1;
pub const ROLE_INNER: u8 = 2;

/// A relation member together with its role bits.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct RelMember {
    pub element: OsmElement,
    pub role: u8,
}

/// Relations that look administrative in the extract but lie outside the
/// covered country or are known to be broken.
const REGION_BLACKLIST: &[i64] = &[
    38091, 50046, 52822, 54224, 404589, 406060, 406106, 406567, 406621, 407717, 408105, 412436,
    1650407, 1724359, 1724456, 2000320, 2375170, 2375171, 2526815, 2541341, 2587236, 2978650,
    4222805,
];

/// Municipalities whose common-usage name drops the trailing "s" of the
/// official name ("Bollnäs kommun" normalizes through "bollnä").
const MUNICIPALITIES_MISSING_S: &[&str] = &[
    "alingså", "bengtsfor", "bollnä", "borå", "degerfor", "grum", "hagfor", "hofor", "hällefor",
    "höganä", "kramfor", "munkfor", "mönsterå", "robertsfor", "sotenä", "storfor", "strängnä",
    "torså", "tranå", "vännä", "västerå",
];

const REGION_PREFIXES: &[&str] = &["landskapet "];
const REGION_SUFFIXES: &[&str] = &["s län", " län", "s kommun", " kommun"];

/// Lowercase a region name and strip the administrative decorations so
/// that "Göteborgs kommun" and "Göteborg" compare equal.
pub fn normalize_region_name(name: &str) -> String {
    let folded = tokenizer::fold_lower(name);
    for prefix in REGION_PREFIXES {
        if let Some(rest) = folded.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    for suffix in REGION_SUFFIXES {
        if let Some(rest) = folded.strip_suffix(suffix) {
            let mut rest = rest.to_string();
            if MUNICIPALITIES_MISSING_S.contains(&rest.as_str()) {
                rest.push('s');
            }
            return rest;
        }
    }
    folded
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct RegionEntry {
    name: String,
    admin_level: u8,
    relation_id: i64,
}

/// The assembled ring set of one administrative relation, with its
/// bounding rectangle for fast rejection.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegionPolygons {
    pub polygons: Vec<Vec<Coord>>,
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

/// An administrative region recognized in query text. `name` is the word
/// combination that matched the region's normalized name.
#[derive(Clone, Debug, PartialEq)]
pub struct KnownRegion {
    pub relation_id: i64,
    pub name: String,
    pub admin_level: u8,
}

/// Administrative boundaries: assembled polygons per relation, the
/// name-lookup list, and the SCB/NUTS-3 code tables.
#[derive(Serialize, Deserialize, Default)]
pub struct AdminIndex {
    regions: FxHashMap<i64, RegionPolygons>,
    names: Vec<RegionEntry>,
    scb_areas: BTreeMap<i32, i64>,
    nuts3_areas: BTreeMap<i32, i64>,
}

impl AdminIndex {
    pub fn new() -> Self {
        AdminIndex::default()
    }

    /// Register a region under its normalized name. Levels of 8 and below
    /// the municipality level are too fine-grained to help and are skipped,
    /// as are blacklisted relations.
    pub fn register_name(&mut self, name: &str, admin_level: u8, relation_id: i64) {
        if admin_level >= 8 || REGION_BLACKLIST.contains(&relation_id) {
            return;
        }
        self.names.push(RegionEntry {
            name: normalize_region_name(name),
            admin_level,
            relation_id,
        });
    }

    /// Sort the name list; required before lookups, done once at the end of
    /// ingest (the snapshot stores the sorted list).
    pub fn sort_names(&mut self) {
        self.names
            .sort_by(|a, b| a.name.cmp(&b.name).then(a.admin_level.cmp(&b.admin_level)));
    }

    /// Find a region by (normalized) name. Among regions sharing the name
    /// the broadest one wins: county over municipality.
    pub fn lookup(&self, name: &str) -> Option<(i64, u8)> {
        let normalized = normalize_region_name(name);
        let idx = self
            .names
            .binary_search_by(|entry| entry.name.as_str().cmp(normalized.as_str()))
            .ok()?;
        let mut first = idx;
        while first > 0 && self.names[first - 1].name == normalized {
            first -= 1;
        }
        let entry = &self.names[first];
        Some((entry.relation_id, entry.admin_level))
    }

    /// Resolve every word combination that names a known region.
    pub fn identify_regions(&self, combinations: &[String]) -> Vec<KnownRegion> {
        combinations
            .iter()
            .filter_map(|combined| {
                let (relation_id, admin_level) = self.lookup(combined)?;
                Some(KnownRegion {
                    relation_id,
                    name: combined.clone(),
                    admin_level,
                })
            })
            .collect()
    }

    pub fn insert_scb(&mut self, code: i32, relation_id: i64) {
        self.scb_areas.insert(code, relation_id);
    }

    pub fn insert_nuts3(&mut self, code: i32, relation_id: i64) {
        self.nuts3_areas.insert(code, relation_id);
    }

    pub fn scb_relation_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.scb_areas.values().copied()
    }

    pub fn nuts3_relation_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.nuts3_areas.values().copied()
    }

    pub fn named_relation_ids(&self) -> Vec<i64> {
        self.names.iter().map(|entry| entry.relation_id).collect()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// SCB municipality/county codes whose region contains the coordinate.
    pub fn scb_codes_containing(&self, coord: Coord) -> Vec<i32> {
        self.scb_areas
            .iter()
            .filter(|(_, &relation_id)| self.contains(relation_id, coord))
            .map(|(&code, _)| code)
            .collect()
    }

    /// NUTS-3 codes whose region contains the coordinate.
    pub fn nuts3_codes_containing(&self, coord: Coord) -> Vec<i32> {
        self.nuts3_areas
            .iter()
            .filter(|(_, &relation_id)| self.contains(relation_id, coord))
            .map(|(&code, _)| code)
            .collect()
    }

    /// Even-odd containment test with bounding-box fast rejection. Unknown
    /// or rejected relations contain nothing.
    pub fn contains(&self, relation_id: i64, coord: Coord) -> bool {
        let region = match self.regions.get(&relation_id) {
            Some(region) => region,
            None => return false,
        };
        if coord.x < region.min_x
            || coord.x > region.max_x
            || coord.y < region.min_y
            || coord.y > region.max_y
        {
            return false;
        }
        region.polygons.iter().any(|polygon| even_odd(polygon, coord))
    }

    /// Assemble the polygon set of a relation from its outer/inner way
    /// members by matching endpoints. A relation whose rings cannot be
    /// closed from the available ways is rejected.
    pub fn assemble(
        &mut self,
        relation_id: i64,
        members: &[RelMember],
        way_nodes: &IdStore<WayNodes>,
        coords: &CoordStore,
    ) {
        if self.regions.contains_key(&relation_id) {
            return;
        }
        let candidates: Vec<i64> = members
            .iter()
            .filter(|m| {
                m.element.kind == ElementKind::Way && m.role & (ROLE_OUTER | ROLE_INNER) != 0
            })
            .map(|m| m.element.id)
            .collect();
        if candidates.is_empty() {
            return;
        }

        let mut attached = vec![false; candidates.len()];
        let mut polygons: Vec<VecDeque<Coord>> = Vec::new();
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (i32::MAX, i32::MAX, -1, -1);
        let mut additions = 0;

        // Ways arrive in arbitrary order, so several rounds may be needed
        // before every segment finds a ring end to attach to.
        let mut round = 0;
        while additions < candidates.len() && round < candidates.len() + 5 {
            round += 1;
            for (i, &way_id) in candidates.iter().enumerate() {
                if attached[i] {
                    continue;
                }
                let points: Vec<Coord> = match way_nodes.get(way_id) {
                    Some(nodes) => nodes.iter().filter_map(|&n| coords.get(n)).collect(),
                    None => {
                        warn!(
                            "relation {} member way {} has no stored nodes",
                            relation_id, way_id
                        );
                        continue;
                    }
                };
                if points.is_empty() {
                    continue;
                }
                if !polygons.iter_mut().any(|polygon| attach(&points, polygon)) {
                    // No ring end matches; the way starts a ring of its own.
                    polygons.push(points.iter().copied().collect());
                }
                additions += 1;
                attached[i] = true;
                for p in &points {
                    min_x = min_x.min(p.x);
                    min_y = min_y.min(p.y);
                    max_x = max_x.max(p.x);
                    max_y = max_y.max(p.y);
                }
            }
        }

        if additions < candidates.len() {
            info!(
                "relation {}: only {} of {} boundary ways attached, skipping region",
                relation_id,
                additions,
                candidates.len()
            );
            return;
        }

        merge_open_polygons(&mut polygons);

        let mut rings: Vec<Vec<Coord>> = Vec::with_capacity(polygons.len());
        for polygon in polygons {
            let mut ring: Vec<Coord> = polygon.into_iter().collect();
            if ring.len() > 1 && ring.first() == ring.last() {
                // The coincident closing vertex is implied.
                ring.pop();
            } else {
                warn!("relation {} has an unclosed ring, skipping region", relation_id);
                return;
            }
            rings.push(ring);
        }

        self.regions.insert(
            relation_id,
            RegionPolygons {
                polygons: rings,
                min_x,
                min_y,
                max_x,
                max_y,
            },
        );
    }

    pub fn region(&self, relation_id: i64) -> Option<&RegionPolygons> {
        self.regions.get(&relation_id)
    }
}

/// Try to attach a way's points to either end of a growing ring, in either
/// orientation. An empty ring accepts the way wholesale.
fn attach(points: &[Coord], polygon: &mut VecDeque<Coord>) -> bool {
    if polygon.is_empty() {
        polygon.extend(points.iter().copied());
        return true;
    }
    let first = points[0];
    let last = points[points.len() - 1];
    if *polygon.front().unwrap() == first {
        for &p in &points[1..] {
            polygon.push_front(p);
        }
        true
    } else if *polygon.back().unwrap() == first {
        polygon.extend(points[1..].iter().copied());
        true
    } else if *polygon.front().unwrap() == last {
        for &p in points[..points.len() - 1].iter().rev() {
            polygon.push_front(p);
        }
        true
    } else if *polygon.back().unwrap() == last {
        polygon.extend(points[..points.len() - 1].iter().rev().copied());
        true
    } else {
        false
    }
}

/// Merge rings whose endpoints coincide, checking all four orientations,
/// until a full pass makes no progress.
fn merge_open_polygons(polygons: &mut Vec<VecDeque<Coord>>) {
    let mut merged = true;
    while merged && polygons.len() > 1 {
        merged = false;
        'scan: for a in 0..polygons.len() {
            let first_a = *polygons[a].front().unwrap();
            let last_a = *polygons[a].back().unwrap();
            if first_a == last_a {
                continue;
            }
            for b in a + 1..polygons.len() {
                let first_b = *polygons[b].front().unwrap();
                let last_b = *polygons[b].back().unwrap();
                let orientation = if first_a == first_b {
                    Some((true, true))
                } else if first_a == last_b {
                    Some((true, false))
                } else if last_a == first_b {
                    Some((false, true))
                } else if last_a == last_b {
                    Some((false, false))
                } else {
                    None
                };
                if let Some((at_front, b_forward)) = orientation {
                    let other = polygons.remove(b);
                    let target = &mut polygons[a];
                    match (at_front, b_forward) {
                        (true, true) => {
                            for p in other.iter().skip(1) {
                                target.push_front(*p);
                            }
                        }
                        (true, false) => {
                            for p in other.iter().rev().skip(1) {
                                target.push_front(*p);
                            }
                        }
                        (false, true) => target.extend(other.iter().skip(1).copied()),
                        (false, false) => target.extend(other.iter().rev().skip(1).copied()),
                    }
                    merged = true;
                    break 'scan;
                }
            }
        }
    }
}

/// Even-odd (ray casting) containment against one ring.
fn even_odd(polygon: &[Coord], c: Coord) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut odd = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let pi = polygon[i];
        let pj = polygon[j];
        if ((pi.y < c.y && pj.y >= c.y) || (pj.y < c.y && pi.y >= c.y))
            && (pi.x <= c.x || pj.x <= c.x)
        {
            let crossing = i64::from(pi.x)
                + i64::from(c.y - pi.y) * i64::from(pj.x - pi.x) / i64::from(pj.y - pi.y);
            odd ^= crossing < i64::from(c.x);
        }
        j = i;
    }
    odd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::Category;

    fn member(way_id: i64, role: u8) -> RelMember {
        RelMember {
            element: OsmElement::new(way_id, ElementKind::Way, Category::Unknown),
            role,
        }
    }

    /// A square region out of two half-rings plus the stores backing it.
    fn square_region() -> (AdminIndex, IdStore<WayNodes>, CoordStore) {
        let mut coords = CoordStore::new();
        coords.insert(1, Coord::new(100, 100));
        coords.insert(2, Coord::new(500, 100));
        coords.insert(3, Coord::new(500, 500));
        coords.insert(4, Coord::new(100, 500));

        let mut way_nodes = IdStore::new();
        way_nodes.insert(10, vec![1, 2, 3]);
        way_nodes.insert(11, vec![3, 4, 1]);

        let mut admin = AdminIndex::new();
        let members = vec![member(10, ROLE_OUTER), member(11, ROLE_OUTER)];
        admin.assemble(99, &members, &way_nodes, &coords);
        (admin, way_nodes, coords)
    }

    #[test]
    fn normalizes_region_names() {
        assert_eq!(normalize_region_name("Göteborgs kommun"), "göteborg");
        assert_eq!(normalize_region_name("Uppsala län"), "uppsala");
        assert_eq!(normalize_region_name("Hallands län"), "halland");
        assert_eq!(normalize_region_name("Landskapet Värmland"), "värmland");
        assert_eq!(normalize_region_name("Kiruna"), "kiruna");
        // The official "Bollnäs kommun" must match the bare name "Bollnäs".
        assert_eq!(normalize_region_name("Bollnäs kommun"), "bollnäs");
    }

    #[test]
    fn lookup_prefers_broader_regions() {
        let mut admin = AdminIndex::new();
        admin.register_name("Uppsala kommun", 7, 305455);
        admin.register_name("Uppsala län", 4, 54220);
        admin.sort_names();
        assert_eq!(admin.lookup("uppsala"), Some((54220, 4)));
        assert_eq!(admin.lookup("Uppsala kommun"), Some((54220, 4)));
        assert_eq!(admin.lookup("falun"), None);
    }

    #[test]
    fn low_level_and_blacklisted_regions_are_not_listed() {
        let mut admin = AdminIndex::new();
        admin.register_name("Kvarteret", 9, 1);
        admin.register_name("Utlandet", 4, 38091);
        admin.sort_names();
        assert!(admin.lookup("kvarteret").is_none());
        assert!(admin.lookup("utlandet").is_none());
    }

    #[test]
    fn assembles_square_from_two_ways() {
        let (admin, _, _) = square_region();
        let region = admin.region(99).expect("region assembled");
        assert_eq!(region.polygons.len(), 1);
        // Closing vertex dropped: four corners remain.
        assert_eq!(region.polygons[0].len(), 4);
        assert_eq!(region.min_x, 100);
        assert_eq!(region.max_y, 500);
    }

    #[test]
    fn bounding_box_covers_all_vertices() {
        let (admin, _, _) = square_region();
        let region = admin.region(99).unwrap();
        for polygon in &region.polygons {
            for v in polygon {
                assert!(region.min_x <= v.x && v.x <= region.max_x);
                assert!(region.min_y <= v.y && v.y <= region.max_y);
            }
        }
    }

    #[test]
    fn containment_follows_even_odd_rule() {
        let (admin, _, _) = square_region();
        assert!(admin.contains(99, Coord::new(300, 300)));
        assert!(!admin.contains(99, Coord::new(600, 300)));
        assert!(!admin.contains(99, Coord::new(99, 99)));
        assert!(!admin.contains(42, Coord::new(300, 300)));
    }

    #[test]
    fn open_rings_reject_the_region() {
        let mut coords = CoordStore::new();
        coords.insert(1, Coord::new(100, 100));
        coords.insert(2, Coord::new(500, 100));
        coords.insert(3, Coord::new(500, 500));

        let mut way_nodes = IdStore::new();
        way_nodes.insert(10, vec![1, 2, 3]);

        let mut admin = AdminIndex::new();
        admin.assemble(7, &[member(10, ROLE_OUTER)], &way_nodes, &coords);
        assert!(admin.region(7).is_none());
        assert!(!admin.contains(7, Coord::new(300, 200)));
    }

    #[test]
    fn scb_codes_resolve_through_containment() {
        let (mut admin, _, _) = square_region();
        admin.insert_scb(1480, 99);
        admin.insert_scb(2580, 12345);
        assert_eq!(admin.scb_codes_containing(Coord::new(300, 300)), vec![1480]);
        assert!(admin.scb_codes_containing(Coord::new(600, 600)).is_empty());
    }
}
