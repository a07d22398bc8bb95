use crate::coord::Coord;
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Compact storage for element names; most stay inline on the stack.
pub type Name = SmartString<LazyCompact>;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ElementKind {
    Node = 0,
    Way = 1,
    Relation = 2,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ElementKind::Node => write!(f, "node"),
            ElementKind::Way => write!(f, "way"),
            ElementKind::Relation => write!(f, "relation"),
        }
    }
}

/// What an element represents in the real world. The discriminants keep the
/// place categories ordered from largest to smallest so that sorting by
/// category puts cities before hamlets.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Category {
    PlaceLargeArea = 0,
    PlaceLarge = 1,
    PlaceMedium = 2,
    PlaceSmall = 3,
    RoadMajor = 10,
    RoadMedium = 11,
    RoadMinor = 12,
    Building = 20,
    Island = 30,
    Water = 31,
    Unknown = 99,
}

impl Category {
    pub fn is_place(self) -> bool {
        matches!(
            self,
            Category::PlaceLargeArea
                | Category::PlaceLarge
                | Category::PlaceMedium
                | Category::PlaceSmall
        )
    }

    /// How trustworthy a match of this category is as a location reference.
    pub fn quality(self) -> f64 {
        match self {
            Category::PlaceLargeArea => 0.8,
            Category::PlaceLarge => 1.0,
            Category::PlaceMedium => 0.85,
            Category::PlaceSmall => 0.7,
            Category::Island => 0.85,
            Category::Water => 0.8,
            Category::Building => 0.9,
            _ => 0.5,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Unknown
    }
}

/// A reference to an OSM node, way, or relation. Two elements are the same
/// element iff kind and id match; the category is metadata and does not
/// take part in equality.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct OsmElement {
    pub id: i64,
    pub kind: ElementKind,
    pub category: Category,
}

impl OsmElement {
    pub fn new(id: i64, kind: ElementKind, category: Category) -> Self {
        OsmElement { id, kind, category }
    }

    pub fn node(id: i64) -> Self {
        OsmElement::new(id, ElementKind::Node, Category::Unknown)
    }
}

impl PartialEq for OsmElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind
    }
}

impl Eq for OsmElement {}

impl Hash for OsmElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Display for OsmElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// The simplified polyline of a way, as node ids.
pub type WayNodes = Vec<i64>;

/// A scored coordinate candidate produced by the matchers.
#[derive(Clone, Debug)]
pub struct SearchResult {
    pub coord: Coord,
    /// Confidence in [0, 1], higher is better.
    pub quality: f64,
    /// Human-readable description of how this candidate was derived.
    pub origin: String,
    /// The elements that contributed evidence.
    pub elements: Vec<OsmElement>,
}

impl SearchResult {
    pub fn new(coord: Coord, quality: f64, origin: String) -> Self {
        SearchResult {
            coord,
            quality,
            origin,
            elements: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_category() {
        let a = OsmElement::new(42, ElementKind::Node, Category::PlaceLarge);
        let b = OsmElement::new(42, ElementKind::Node, Category::Water);
        assert_eq!(a, b);

        let c = OsmElement::new(42, ElementKind::Way, Category::PlaceLarge);
        assert_ne!(a, c);
    }

    #[test]
    fn place_categories_sort_large_to_small() {
        let mut places = vec![
            Category::PlaceSmall,
            Category::PlaceLarge,
            Category::PlaceMedium,
            Category::PlaceLargeArea,
        ];
        places.sort();
        assert_eq!(places[0], Category::PlaceLargeArea);
        assert_eq!(places[3], Category::PlaceSmall);
    }

    #[test]
    fn quality_prefers_large_places() {
        assert!(Category::PlaceLarge.quality() > Category::PlaceMedium.quality());
        assert!(Category::PlaceMedium.quality() > Category::PlaceSmall.quality());
        assert_eq!(Category::RoadMajor.quality(), 0.5);
    }
}
