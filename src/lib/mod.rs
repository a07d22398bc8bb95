//! A geographic named-entity resolver for Swedish text over OSM protobuf
//! bundles: ingest a country extract once, then map free-form prose like
//! "Riksväg 40 mellan Borås och Ulricehamn" to ranked coordinates.

use crate::admin::{AdminIndex, RelMember};
use crate::config::Config;
use crate::coord::{Coord, Grid};
use crate::idstore::{CoordStore, IdStore};
use crate::items::{Name, WayNodes};
use crate::roads::RoadIndex;
use crate::texttree::TextTree;
use crate::tokenizer::{Multiplicity, Tokenizer};
use log::info;

pub mod admin;
pub mod config;
pub mod coord;
pub mod error;
pub mod idstore;
mod ingest;
pub mod items;
pub mod matcher;
mod results;
pub mod roads;
mod simplify;
mod snapshot;
#[doc(hidden)]
pub mod test_helpers;
pub mod texttree;
pub mod tokenizer;

pub use crate::error::{Error, Result};
pub use crate::items::{Category, ElementKind, OsmElement, SearchResult};

/// All indices over one map extract, built once and queried read-only.
pub struct World {
    pub grid: Grid,
    pub tokenizer: Tokenizer,
    pub coords: CoordStore,
    pub way_nodes: IdStore<WayNodes>,
    pub rel_members: IdStore<Vec<RelMember>>,
    pub node_names: IdStore<Name>,
    pub way_names: IdStore<Name>,
    pub rel_names: IdStore<Name>,
    pub names: TextTree,
    pub admin: AdminIndex,
    pub roads: RoadIndex,
}

impl World {
    pub fn empty(grid: Grid, tokenizer: Tokenizer) -> World {
        World {
            grid,
            tokenizer,
            coords: CoordStore::new(),
            way_nodes: IdStore::new(),
            rel_members: IdStore::new(),
            node_names: IdStore::new(),
            way_names: IdStore::new(),
            rel_names: IdStore::new(),
            names: TextTree::new(),
            admin: AdminIndex::new(),
            roads: RoadIndex::new(),
        }
    }

    /// Build the world from snapshots when a complete set exists for the
    /// configured map name, otherwise ingest the PBF extract and write a
    /// fresh snapshot set.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use osm_text2coord::config::Config;
    /// use osm_text2coord::World;
    ///
    /// let config = Config::from_file("sweden.config.json").unwrap();
    /// let world = World::load_or_ingest(&config).unwrap();
    /// let results = world.find_results("Uppsala universitet", 250, 20);
    /// assert!(!results.is_empty());
    /// ```
    pub fn load_or_ingest(config: &Config) -> Result<World> {
        let tokenizer = Tokenizer::from_file(&config.stopwordfilename)?;
        let dir = config.snapshot_dir();
        if snapshot::present(&dir, &config.mapname) {
            return snapshot::load(&dir, &config.mapname, tokenizer);
        }
        info!("no usable snapshots for '{}', ingesting", config.mapname);
        let world = Self::ingest_with(config, tokenizer)?;
        snapshot::save(&world, &dir, &config.mapname)?;
        Ok(world)
    }

    /// Ingest the configured PBF extract unconditionally and rewrite the
    /// snapshots.
    pub fn ingest(config: &Config) -> Result<World> {
        let tokenizer = Tokenizer::from_file(&config.stopwordfilename)?;
        let world = Self::ingest_with(config, tokenizer)?;
        snapshot::save(&world, &config.snapshot_dir(), &config.mapname)?;
        Ok(world)
    }

    fn ingest_with(config: &Config, tokenizer: Tokenizer) -> Result<World> {
        let pbf = config.osmpbffilename.as_ref().ok_or_else(|| {
            Error::Config("no usable snapshots and no osmpbffilename configured".to_string())
        })?;
        ingest::ingest_pbf(pbf, Grid::sweden(), tokenizer)
    }

    /// Write the snapshot file set for this world.
    pub fn save_snapshots<P: AsRef<std::path::Path>>(&self, dir: P, mapname: &str) -> Result<()> {
        snapshot::save(self, dir.as_ref(), mapname)
    }

    /// The stored canonical name of an element, if it has one.
    pub fn name_of(&self, element: &OsmElement) -> Option<&str> {
        let store = match element.kind {
            ElementKind::Node => &self.node_names,
            ElementKind::Way => &self.way_names,
            ElementKind::Relation => &self.rel_names,
        };
        store.get(element.id).map(|name| &**name)
    }

    /// Resolve free-form text to a ranked list of coordinate candidates.
    /// Results closer than `duplicate_proximity_m` meters to a better one
    /// are dropped; at most `limit` results are returned. Text that yields
    /// no candidate produces an empty list, never an error.
    pub fn find_results(
        &self,
        text: &str,
        duplicate_proximity_m: i32,
        limit: usize,
    ) -> Vec<SearchResult> {
        let words = self.tokenizer.read_words(text, Multiplicity::Duplicates);
        let combinations = self.tokenizer.word_combinations(&words, 3);
        info!(
            "{} words give {} word combinations",
            words.len(),
            combinations.len()
        );
        let mut candidates: Vec<SearchResult> = Vec::new();

        // Road designations close to mentioned places.
        let identified_roads = roads::identify_roads(&words);
        info!("{} road designations in text", identified_roads.len());
        for m in matcher::match_roads(self, &combinations, &identified_roads) {
            if m.distance_m >= 10_000 {
                continue;
            }
            if let Some(coord) = self.coords.get(m.road_node) {
                let mut result = SearchResult::new(
                    coord,
                    m.quality,
                    format!("road {} near '{}'", m.road, m.combination),
                );
                result.elements.push(OsmElement::node(m.road_node));
                result.elements.push(OsmElement::node(m.place_node));
                candidates.push(result);
            }
        }

        // Named things inside mentioned administrative regions.
        let regions = self.admin.identify_regions(&combinations);
        info!("{} administrative regions in text", regions.len());
        for m in matcher::match_in_regions(self, &regions, &combinations) {
            if let Some(coord) = matcher::center_of(self, &m.element) {
                let name = self.name_of(&m.element).unwrap_or("unnamed");
                let mut result = SearchResult::new(
                    coord,
                    m.quality * 0.95,
                    format!(
                        "'{}' ({}) inside region '{}' (relation {}), via '{}'",
                        name, m.element, m.region.name, m.region.relation_id, m.combination
                    ),
                );
                result.elements.push(OsmElement::new(
                    m.region.relation_id,
                    ElementKind::Relation,
                    Category::PlaceLargeArea,
                ));
                result.elements.push(m.element);
                candidates.push(result);
            }
        }

        // Local names near the most prominent mentioned places.
        let mut global = matcher::global_places(self, &combinations);
        if let Some(first) = global.first() {
            let best_category = first.category;
            global.retain(|place| place.category == best_category);
        }
        for m in matcher::match_near_places(self, &combinations, &global) {
            if let Some(coord) = matcher::center_of(self, &m.local) {
                let local_name = self.name_of(&m.local).unwrap_or("unnamed");
                let global_name = self.name_of(&m.global).unwrap_or("unnamed");
                let mut result = SearchResult::new(
                    coord,
                    m.quality * 0.75,
                    format!(
                        "local {} ('{}') near {} ('{}')",
                        m.local, local_name, m.global, global_name
                    ),
                );
                result.elements.push(m.global);
                result.elements.push(m.local);
                candidates.push(result);
            }
        }

        // Names that are (nearly) unique in the map.
        for m in matcher::match_unique_names(self, &combinations) {
            if let Some(coord) = matcher::center_of(self, &m.element) {
                let name = self.name_of(&m.element).unwrap_or("unnamed");
                let mut result = SearchResult::new(
                    coord,
                    m.quality * 0.8,
                    format!("unique name '{}' ({}) via '{}'", name, m.element, m.combination),
                );
                result.elements.push(m.element);
                candidates.push(result);
            }
        }

        // Fall back on the most prominent mentioned place by itself; a weak
        // but useful answer when nothing else sticks.
        if let Some(best) = fallback_place(&global) {
            if let Some(coord) = matcher::center_of(self, &best) {
                let quality = match best.category {
                    Category::PlaceLarge => 1.0,
                    Category::PlaceMedium => 0.9,
                    Category::PlaceSmall => 0.8,
                    Category::PlaceLargeArea => 0.6,
                    _ => 0.5,
                };
                let name = self.name_of(&best).unwrap_or("unnamed");
                let mut result = SearchResult::new(
                    coord,
                    quality * 0.5,
                    format!("large place '{}' ({})", name, best),
                );
                result.elements.push(best);
                candidates.push(result);
            }
        }

        let results = results::aggregate(candidates, duplicate_proximity_m, limit);
        info!("{} results", results.len());
        results
    }

    /// The grid coordinate of a result as (latitude, longitude).
    pub fn latlon(&self, coord: Coord) -> (f64, f64) {
        let (lon, lat) = self.grid.lonlat(coord);
        (lat, lon)
    }
}

/// Pick a place worth reporting on its own: medium or larger. A list of
/// only small places yields nothing.
fn fallback_place(places: &[OsmElement]) -> Option<OsmElement> {
    let mut best: Option<OsmElement> = None;
    let mut rank = Category::PlaceSmall;
    for place in places {
        let category = place.category;
        if category == Category::PlaceMedium && rank >= Category::PlaceSmall {
            best = Some(*place);
            rank = category;
        } else if category < Category::PlaceMedium && rank >= Category::PlaceMedium {
            best = Some(*place);
            rank = category;
        } else if rank != Category::PlaceLarge && category == Category::PlaceLargeArea {
            best = Some(*place);
            rank = category;
        } else if rank == Category::PlaceLargeArea && category == Category::PlaceLarge {
            best = Some(*place);
            rank = category;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::WorldBuilder;

    #[test]
    fn empty_text_yields_empty_results() {
        let world = WorldBuilder::new().build();
        assert!(world.find_results("", 250, 20).is_empty());
        assert!(world.find_results("och i mellan", 250, 20).is_empty());
    }

    #[test]
    fn unknown_places_yield_empty_results() {
        let world = WorldBuilder::new()
            .named_node(1, 17.63, 59.86, "Uppsala", Category::PlaceLarge)
            .build();
        assert!(world.find_results("Atlantis", 250, 20).is_empty());
    }

    #[test]
    fn fallback_needs_medium_or_larger_places() {
        let small = OsmElement::new(1, ElementKind::Node, Category::PlaceSmall);
        let medium = OsmElement::new(2, ElementKind::Node, Category::PlaceMedium);
        let large = OsmElement::new(3, ElementKind::Node, Category::PlaceLarge);
        assert_eq!(fallback_place(&[small]), None);
        assert_eq!(fallback_place(&[small, medium]), Some(medium));
        assert_eq!(fallback_place(&[medium, large]), Some(large));
    }

    #[test]
    fn single_known_place_is_found() {
        let world = WorldBuilder::new()
            .named_node(1, 17.63, 59.86, "Uppsala", Category::PlaceLarge)
            .build();
        let results = world.find_results("vid Uppsala", 250, 20);
        assert!(!results.is_empty());
        let (lat, lon) = world.latlon(results[0].coord);
        assert!((lat - 59.86).abs() < 0.01);
        assert!((lon - 17.63).abs() < 0.01);
    }
}
