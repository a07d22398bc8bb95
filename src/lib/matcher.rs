use crate::admin::KnownRegion;
use crate::coord::Coord;
use crate::items::{Category, ElementKind, OsmElement};
use crate::roads::Road;
use crate::tokenizer;
use crate::World;
use log::debug;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// A place name found close to a road designation.
#[derive(Clone, Debug)]
pub struct RoadMatch {
    pub combination: String,
    pub road: Road,
    pub road_node: i64,
    pub place_node: i64,
    pub distance_m: i64,
    pub quality: f64,
}

/// Distance-based quality: 1 km or closer scores 1.0, 10 km scores 0.5,
/// 100 km scores 0.
fn road_quality(distance_m: i64) -> f64 {
    let quality = 1.0 - ((distance_m as f64).log10() - 3.0) / 2.0;
    quality.max(0.0).min(1.0)
}

/// For every word combination naming a place, find the closest point on
/// every identified road.
pub fn match_roads(world: &World, combinations: &[String], roads: &[Road]) -> Vec<RoadMatch> {
    let mut matches = Vec::new();
    if roads.is_empty() {
        return matches;
    }
    for combined in combinations {
        let elements = world.names.retrieve(combined);
        if elements.is_empty() {
            continue;
        }
        debug!("{} hits for combination '{}'", elements.len(), combined);
        for &road in roads {
            let mut best: Option<(i64, i64, Road, i64)> = None;
            for element in &elements {
                // Only place nodes serve as reference points.
                if element.kind != ElementKind::Node || !element.category.is_place() {
                    continue;
                }
                let coord = match world.coords.get(element.id) {
                    Some(coord) => coord,
                    None => continue,
                };
                if let Some(hit) =
                    world
                        .roads
                        .closest_road_node(coord, road, &world.way_nodes, &world.coords)
                {
                    if best.map_or(true, |(_, _, _, d)| hit.distance_m < d) {
                        best = Some((hit.node_id, element.id, hit.road, hit.distance_m));
                    }
                }
            }
            if let Some((road_node, place_node, road, distance_m)) = best {
                matches.push(RoadMatch {
                    combination: combined.clone(),
                    road,
                    road_node,
                    place_node,
                    distance_m,
                    quality: road_quality(distance_m),
                });
            }
        }
    }
    matches.sort_by_key(|m| m.distance_m);
    matches
}

/// A named element located inside a recognized administrative region.
#[derive(Clone, Debug)]
pub struct RegionMatch {
    pub combination: String,
    pub element: OsmElement,
    pub region: KnownRegion,
    pub quality: f64,
}

fn in_narrow_place_band(category: Category) -> bool {
    matches!(
        category,
        Category::PlaceLarge | Category::PlaceMedium | Category::PlaceSmall
    )
}

fn region_quality(combination: &str, element: &OsmElement, region: &KnownRegion) -> f64 {
    // A region name at the start of the combination ("Kiruna kommun") adds
    // nothing beyond the region itself; a late or absent region name means
    // the combination carries independent evidence.
    let mut quality = match combination.find(&region.name) {
        None => 1.0,
        Some(pos) => pos as f64 / (combination.len() - pos + 1) as f64,
    };
    if quality > 0.0 {
        if !in_narrow_place_band(element.category) {
            quality *= 0.9;
        }
        let level = f64::from(region.admin_level.max(2).min(9));
        quality *= (level + 18.0) / 27.0;
    }
    quality
}

/// Test the elements behind every word combination for containment in the
/// recognized regions. Two heuristics limit the polygon tests: elements
/// with near-consecutive ids reuse the previous verdict, and an element
/// within 3 km of the previous one is skipped outright.
pub fn match_in_regions(
    world: &World,
    regions: &[KnownRegion],
    combinations: &[String],
) -> Vec<RegionMatch> {
    let mut matches = Vec::new();
    if regions.is_empty() || combinations.is_empty() {
        return matches;
    }
    for combined in combinations {
        let elements = world.names.retrieve(combined);
        let mut prev: Option<OsmElement> = None;
        let mut prev_coord: Option<Coord> = None;
        for element in elements {
            if let Some(prev_element) = prev {
                if element.kind == prev_element.kind && (element.id - prev_element.id).abs() <= 4 {
                    prev = Some(element);
                    prev_coord = center_of(world, &element);
                    continue;
                }
            }
            let coord = match center_of(world, &element) {
                Some(coord) => coord,
                None => continue,
            };
            if let Some(pc) = prev_coord {
                if pc.is_valid() && Coord::grid_distance_sq(coord, pc) < 9_000_000 {
                    prev = Some(element);
                    prev_coord = Some(coord);
                    continue;
                }
            }

            // A hit at some admin level rules out all broader levels for
            // this element; regions of one level do not overlap.
            let mut inside_level = u8::MAX;
            for region in regions {
                if region.admin_level >= inside_level {
                    continue;
                }
                if region.relation_id > 0
                    && region.relation_id != element.id
                    && world.admin.contains(region.relation_id, coord)
                {
                    matches.push(RegionMatch {
                        combination: combined.clone(),
                        element,
                        region: region.clone(),
                        quality: region_quality(combined, &element, region),
                    });
                    inside_level = region.admin_level;
                }
            }

            prev = Some(element);
            prev_coord = Some(coord);
        }
    }

    matches.sort_by(|a, b| {
        let pos_a = a.combination.find(&a.region.name).unwrap_or(usize::MAX);
        let pos_b = b.combination.find(&b.region.name).unwrap_or(usize::MAX);
        pos_b
            .cmp(&pos_a)
            .then_with(|| {
                in_narrow_place_band(b.element.category)
                    .cmp(&in_narrow_place_band(a.element.category))
            })
            .then_with(|| {
                let spaces_a = a.combination.matches(' ').count();
                let spaces_b = b.combination.matches(' ').count();
                spaces_b.cmp(&spaces_a)
            })
            .then_with(|| b.combination.len().cmp(&a.combination.len()))
    });
    matches
}

/// A locally named element within reach of a larger, independently
/// mentioned place.
#[derive(Clone, Debug)]
pub struct NearPlaceMatch {
    pub combination: String,
    pub global: OsmElement,
    pub local: OsmElement,
    pub distance_m: i64,
    pub quality: f64,
}

const NEAR_PLACE_LIMIT_M: i64 = 20_000;

fn near_place_quality(world: &World, combination: &str, global: &OsmElement) -> (usize, f64) {
    let global_name = world
        .name_of(global)
        .map(tokenizer::fold_lower)
        .unwrap_or_default();
    let pos = if global_name.is_empty() {
        None
    } else {
        combination.find(&global_name)
    };
    let quality = match pos {
        None => 1.0,
        Some(p) => p as f64 / (combination.len() - p + 1) as f64,
    };
    (
        pos.unwrap_or(usize::MAX),
        quality * global.category.quality(),
    )
}

/// Pair every element matching a word combination with the nearest global
/// place, keeping pairs closer than 20 km.
pub fn match_near_places(
    world: &World,
    combinations: &[String],
    places: &[OsmElement],
) -> Vec<NearPlaceMatch> {
    let mut matches = Vec::new();
    if places.is_empty() {
        return matches;
    }
    let place_coords: Vec<(OsmElement, Coord)> = places
        .iter()
        .filter_map(|place| center_of(world, place).map(|coord| (*place, coord)))
        .collect();

    for combined in combinations {
        for element in world.names.retrieve(combined) {
            let coord = match center_of(world, &element) {
                Some(coord) => coord,
                None => continue,
            };
            let mut best: Option<(&OsmElement, i64)> = None;
            for (place, place_coord) in &place_coords {
                if place.id == element.id {
                    continue;
                }
                let distance = world.grid.distance_meters(coord, *place_coord);
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((place, distance));
                }
            }
            if let Some((global, distance_m)) = best {
                if distance_m <= NEAR_PLACE_LIMIT_M {
                    let (_, quality) = near_place_quality(world, combined, global);
                    matches.push(NearPlaceMatch {
                        combination: combined.clone(),
                        global: *global,
                        local: element,
                        distance_m,
                        quality,
                    });
                }
            }
        }
    }

    matches.sort_by(|a, b| {
        let (pos_a, _) = near_place_quality(world, &a.combination, &a.global);
        let (pos_b, _) = near_place_quality(world, &b.combination, &b.global);
        pos_b
            .cmp(&pos_a)
            .then_with(|| a.distance_m.cmp(&b.distance_m))
    });
    matches
}

/// A word combination with (nearly) unique presence in the map data.
#[derive(Clone, Debug)]
pub struct UniqueMatch {
    pub combination: String,
    pub element: OsmElement,
    pub quality: f64,
}

const UNIQUE_HIT_LIMIT: usize = 30;
const UNIQUE_INNER_THRESHOLD_M: i64 = 1_000;
const UNIQUE_OUTER_THRESHOLD_M: i64 = 31_622; // 10^4.5

struct InterElementDistance {
    most_central_node: i64,
    first_quartile_m: i64,
}

/// Estimate how tightly the nodes behind a set of elements cluster by
/// sampling pairwise distances with a stride sharing no divisor with the
/// node count, and locate the most central sampled node.
fn inter_element_distance(world: &World, elements: &[OsmElement]) -> Option<InterElementDistance> {
    let mut node_ids: BTreeSet<i64> = BTreeSet::new();
    for element in elements {
        match element.kind {
            ElementKind::Node => {
                node_ids.insert(element.id);
            }
            ElementKind::Way => {
                if let Some(nodes) = world.way_nodes.get(element.id) {
                    node_ids.extend(nodes.iter().copied());
                }
            }
            ElementKind::Relation => {
                if let Some(members) = world.rel_members.get(element.id) {
                    for member in members {
                        match member.element.kind {
                            ElementKind::Node => {
                                node_ids.insert(member.element.id);
                            }
                            ElementKind::Way => {
                                if let Some(nodes) = world.way_nodes.get(member.element.id) {
                                    node_ids.extend(nodes.iter().copied());
                                }
                            }
                            ElementKind::Relation => {}
                        }
                    }
                }
            }
        }
    }

    let ids: Vec<i64> = node_ids.into_iter().collect();
    let n = ids.len();
    if n <= 1 {
        return None;
    }

    let stepcount = (n - 1).min(7.min((n / 2).max(1)));
    let mut step = n / stepcount;
    while n % step == 0 && step < n {
        step += 1;
    }
    if step >= n {
        step = 1;
    }
    let step = step.max(1).min(n - 1);

    let mut distances: Vec<i64> = Vec::new();
    let mut best_average = i64::MAX;
    let mut most_central_node = 0;
    for a in 0..n {
        let coord_a = match world.coords.get(ids[a]) {
            Some(coord) => coord,
            None => continue,
        };
        let mut sum = 0;
        let mut count = 0;
        let mut b = a;
        for _ in 0..stepcount {
            b = (b + step) % n;
            if let Some(coord_b) = world.coords.get(ids[b]) {
                let distance = world.grid.distance_meters(coord_a, coord_b);
                if a < b {
                    distances.push(distance);
                }
                sum += distance;
                count += 1;
            }
        }
        if count > 0 && sum / count < best_average {
            best_average = sum / count;
            most_central_node = ids[a];
        }
    }
    if distances.is_empty() {
        return None;
    }
    distances.sort_unstable();
    Some(InterElementDistance {
        most_central_node,
        first_quartile_m: distances[distances.len() / 4],
    })
}

/// Accept word combinations with few enough hits that they plausibly all
/// describe one real-world thing, e.g. the nodes shaping a single building.
pub fn match_unique_names(world: &World, combinations: &[String]) -> Vec<UniqueMatch> {
    let mut matches = Vec::new();
    for combined in combinations {
        let elements = world.names.retrieve(combined);
        if elements.is_empty() || elements.len() >= UNIQUE_HIT_LIMIT {
            continue;
        }
        if elements.len() == 1 {
            matches.push(UniqueMatch {
                combination: combined.clone(),
                element: elements[0],
                quality: elements[0].category.quality(),
            });
            continue;
        }

        let estimate = match inter_element_distance(world, &elements) {
            Some(estimate) => estimate,
            None => continue,
        };
        if estimate.first_quartile_m <= 0 || estimate.first_quartile_m >= UNIQUE_OUTER_THRESHOLD_M {
            continue;
        }
        let central = match world.coords.get(estimate.most_central_node) {
            Some(coord) => coord,
            None => continue,
        };
        let mut best: Option<(OsmElement, i64)> = None;
        for element in &elements {
            if let Some(coord) = center_of(world, element) {
                let distance = Coord::grid_distance(central, coord);
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((*element, distance));
                }
            }
        }
        if let Some((element, distance)) = best {
            if distance < UNIQUE_OUTER_THRESHOLD_M {
                let mut quality = element.category.quality();
                if distance > UNIQUE_INNER_THRESHOLD_M {
                    quality *= (4.5 - (distance as f64).log10()) / 1.5;
                }
                matches.push(UniqueMatch {
                    combination: combined.clone(),
                    element,
                    quality,
                });
            }
        }
    }
    matches.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));
    matches
}

/// All place-category elements reachable from the word combinations,
/// largest category first.
pub fn global_places(world: &World, combinations: &[String]) -> Vec<OsmElement> {
    let mut places: Vec<OsmElement> = combinations
        .iter()
        .flat_map(|combined| world.names.retrieve(combined))
        .filter(|element| element.category.is_place())
        .collect();
    places.sort_by_key(|place| place.category);
    places
}

/// A representative coordinate for any element: a node's own coordinate,
/// the average over a way's first/last/middle/quartile nodes, or a breadth
/// first walk into a relation's members collecting the same node samples.
pub fn center_of(world: &World, element: &OsmElement) -> Option<Coord> {
    let mut queue: VecDeque<OsmElement> = VecDeque::new();
    let mut visited_relations: HashSet<i64> = HashSet::new();
    let mut node_ids: BTreeSet<i64> = BTreeSet::new();
    queue.push_back(*element);

    while let Some(cur) = queue.pop_front() {
        match cur.kind {
            ElementKind::Node => {
                node_ids.insert(cur.id);
            }
            ElementKind::Way => {
                if let Some(nodes) = world.way_nodes.get(cur.id) {
                    if let (Some(&first), Some(&last)) = (nodes.first(), nodes.last()) {
                        node_ids.insert(first);
                        node_ids.insert(last);
                        if nodes.len() > 4 {
                            node_ids.insert(nodes[nodes.len() / 2]);
                            if nodes.len() > 16 {
                                node_ids.insert(nodes[nodes.len() / 4]);
                                node_ids.insert(nodes[nodes.len() * 3 / 4]);
                            }
                        }
                    }
                }
            }
            ElementKind::Relation => {
                if visited_relations.insert(cur.id) {
                    if let Some(members) = world.rel_members.get(cur.id) {
                        for member in members {
                            queue.push_back(member.element);
                        }
                    }
                }
            }
        }
    }

    let mut sum_x: i64 = 0;
    let mut sum_y: i64 = 0;
    let mut count: i64 = 0;
    for id in node_ids {
        if let Some(coord) = world.coords.get(id) {
            sum_x += i64::from(coord.x);
            sum_y += i64::from(coord.y);
            count += 1;
        }
    }
    if count > 0 {
        Some(Coord::new((sum_x / count) as i32, (sum_y / count) as i32))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roads::RoadKind;
    use crate::test_helpers::WorldBuilder;

    #[test]
    fn road_quality_follows_log_distance() {
        assert!((road_quality(1_000) - 1.0).abs() < 1e-9);
        assert!((road_quality(10_000) - 0.5).abs() < 1e-9);
        assert_eq!(road_quality(100_000), 0.0);
        assert_eq!(road_quality(500), 1.0);
    }

    #[test]
    fn finds_road_near_place() {
        let world = WorldBuilder::new()
            .named_node(1, 14.16, 57.78, "Jönköping", Category::PlaceLarge)
            .node(2, 14.10, 57.75)
            .node(3, 14.20, 57.80)
            .road_way(10, &[2, 3], "E 4")
            .build();

        let roads = vec![Road::new(RoadKind::Europe, 4)];
        let combinations = vec!["jönköping".to_string()];
        let matches = match_roads(&world, &combinations, &roads);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].place_node, 1);
        assert!(matches[0].distance_m < 10_000);
        assert!(matches[0].quality > 0.5);
    }

    #[test]
    fn region_matcher_reports_places_inside_the_region() {
        let world = WorldBuilder::new()
            .named_node(1, 20.22, 67.85, "Kirunavaara", Category::PlaceSmall)
            .named_node(2, 11.97, 57.70, "Göteborg", Category::PlaceLarge)
            .square_region(500, "Kiruna kommun", 7, 20.0, 67.6, 20.6, 68.0)
            .build();

        let combinations = vec!["kiruna".to_string(), "kirunavaara".to_string()];
        let regions = world.admin.identify_regions(&combinations);
        assert_eq!(regions.len(), 1);

        let matches = match_in_regions(&world, &regions, &combinations);
        assert!(matches.iter().any(|m| m.element.id == 1));
        assert!(matches.iter().all(|m| m.element.id != 2));
    }

    #[test]
    fn region_quality_prefers_late_region_mentions() {
        let region = KnownRegion {
            relation_id: 500,
            name: "kiruna".to_string(),
            admin_level: 7,
        };
        let element = OsmElement::new(1, ElementKind::Node, Category::PlaceSmall);
        let early = region_quality("kiruna gruvan", &element, &region);
        let late = region_quality("gruvan kiruna", &element, &region);
        let absent = region_quality("gruvan", &element, &region);
        assert!(early < late);
        assert!(late < absent);
    }

    #[test]
    fn near_place_matcher_links_local_to_global() {
        let world = WorldBuilder::new()
            .named_node(1, 17.63, 59.86, "Uppsala", Category::PlaceLarge)
            .named_node(2, 17.64, 59.85, "Studenternas", Category::PlaceSmall)
            .named_node(3, 11.97, 57.70, "Göteborg", Category::PlaceLarge)
            .build();

        let combinations = vec!["studenternas".to_string(), "uppsala".to_string()];
        let places = global_places(&world, &combinations);
        let matches = match_near_places(&world, &combinations, &places);
        let local = matches
            .iter()
            .find(|m| m.local.id == 2)
            .expect("local place matched");
        assert_eq!(local.global.id, 1);
        assert!(local.distance_m <= 20_000);
    }

    #[test]
    fn unique_matcher_accepts_single_hits() {
        let world = WorldBuilder::new()
            .named_node(1, 17.63, 59.86, "Blåsenhus", Category::PlaceSmall)
            .build();
        let matches = match_unique_names(&world, &["blåsenhus".to_string()]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].element.id, 1);
        assert!((matches[0].quality - 0.7).abs() < 1e-9);
    }

    #[test]
    fn unique_matcher_accepts_tight_clusters_only() {
        let mut builder = WorldBuilder::new();
        // Four nodes shaping one building, a few meters apart.
        for (i, (lon, lat)) in [(17.630, 59.860), (17.631, 59.860), (17.631, 59.861), (17.630, 59.861)]
            .iter()
            .enumerate()
        {
            builder = builder.named_node(i as i64 + 1, *lon, *lat, "Carolina Rediviva", Category::Building);
        }
        let world = builder.build();
        let matches = match_unique_names(&world, &["carolina rediviva".to_string()]);
        assert_eq!(matches.len(), 1);

        // The same name scattered across the country is not unique.
        let mut builder = WorldBuilder::new();
        for (i, (lon, lat)) in [(11.97, 57.70), (17.63, 59.86), (20.22, 67.85), (13.0, 55.6)]
            .iter()
            .enumerate()
        {
            builder = builder.named_node(i as i64 + 1, *lon, *lat, "Storgatan", Category::PlaceSmall);
        }
        let world = builder.build();
        let matches = match_unique_names(&world, &["storgatan".to_string()]);
        assert!(matches.is_empty());
    }

    #[test]
    fn center_of_way_averages_sampled_nodes() {
        let world = WorldBuilder::new()
            .node(1, 17.60, 59.80)
            .node(2, 17.70, 59.90)
            .way(10, &[1, 2])
            .build();
        let way = OsmElement::new(10, ElementKind::Way, Category::Unknown);
        let center = center_of(&world, &way).expect("center");
        let a = world.coords.get(1).unwrap();
        let b = world.coords.get(2).unwrap();
        assert_eq!(i64::from(center.x), (i64::from(a.x) + i64::from(b.x)) / 2);
        assert_eq!(i64::from(center.y), (i64::from(a.y) + i64::from(b.y)) / 2);
    }

    #[test]
    fn center_of_survives_relation_cycles() {
        let world = WorldBuilder::new()
            .node(1, 17.60, 59.80)
            .relation_with_members(20, &[(21, ElementKind::Relation)])
            .relation_with_members(21, &[(20, ElementKind::Relation), (1, ElementKind::Node)])
            .build();
        let rel = OsmElement::new(20, ElementKind::Relation, Category::Unknown);
        let center = center_of(&world, &rel).expect("center despite cycle");
        assert_eq!(center, world.coords.get(1).unwrap());
    }

    #[test]
    fn global_places_sort_largest_first() {
        let world = WorldBuilder::new()
            .named_node(1, 17.63, 59.86, "Uppsala", Category::PlaceLarge)
            .named_node(2, 17.64, 59.85, "Sunnersta", Category::PlaceSmall)
            .build();
        let places = global_places(
            &world,
            &["uppsala".to_string(), "sunnersta".to_string()],
        );
        assert_eq!(places.first().map(|p| p.id), Some(1));
    }
}
