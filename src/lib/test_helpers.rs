use crate::admin::{RelMember, ROLE_OUTER};
use crate::coord::Grid;
use crate::items::{Category, ElementKind, OsmElement};
use crate::tokenizer::Tokenizer;
use crate::World;

/// Assemble a small synthetic world for tests, index by index, the way
/// ingest would.
#[allow(dead_code)]
pub struct WorldBuilder {
    world: World,
    regions: Vec<(i64, String, u8)>,
}

#[allow(dead_code)]
impl WorldBuilder {
    pub fn new() -> Self {
        let stopwords = [
            "av", "den", "det", "en", "ett", "för", "i", "mellan", "med", "nära", "och", "på",
            "som", "till", "vid", "är",
        ];
        WorldBuilder {
            world: World::empty(
                Grid::sweden(),
                Tokenizer::from_words(stopwords.iter().map(|s| s.to_string()).collect()),
            ),
            regions: Vec::new(),
        }
    }

    pub fn node(mut self, id: i64, lon: f64, lat: f64) -> Self {
        let coord = self.world.grid.coord(lon, lat);
        self.world.coords.insert(id, coord);
        self
    }

    pub fn named_node(mut self, id: i64, lon: f64, lat: f64, name: &str, category: Category) -> Self {
        self = self.node(id, lon, lat);
        let element = OsmElement::new(id, ElementKind::Node, category);
        self.world.names.insert(name, element);
        self.world.node_names.insert(id, name.into());
        self.world.coords.pin(id);
        self
    }

    pub fn way(mut self, id: i64, nodes: &[i64]) -> Self {
        for &node in nodes {
            self.world.coords.pin(node);
        }
        self.world.way_nodes.insert(id, nodes.to_vec());
        self
    }

    pub fn named_way(mut self, id: i64, nodes: &[i64], name: &str, category: Category) -> Self {
        self = self.way(id, nodes);
        let element = OsmElement::new(id, ElementKind::Way, category);
        self.world.names.insert(name, element);
        self.world.way_names.insert(id, name.into());
        self
    }

    /// A way carrying a road `ref`, e.g. "E 4" or "M 625".
    pub fn road_way(mut self, id: i64, nodes: &[i64], ref_value: &str) -> Self {
        self = self.way(id, nodes);
        self.world.roads.insert_ref(id, ref_value);
        self
    }

    pub fn relation_with_members(mut self, id: i64, members: &[(i64, ElementKind)]) -> Self {
        let members: Vec<RelMember> = members
            .iter()
            .map(|&(member_id, kind)| RelMember {
                element: OsmElement::new(member_id, kind, Category::Unknown),
                role: 0,
            })
            .collect();
        self.world.rel_members.insert(id, members);
        self
    }

    pub fn named_relation(mut self, id: i64, name: &str, category: Category) -> Self {
        let element = OsmElement::new(id, ElementKind::Relation, category);
        self.world.names.insert(name, element);
        self.world.rel_names.insert(id, name.into());
        self
    }

    /// An axis-aligned rectangular admin region assembled from one closed
    /// outer way. Node and way ids are derived from the relation id.
    pub fn square_region(
        mut self,
        relation_id: i64,
        name: &str,
        admin_level: u8,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Self {
        let base = relation_id * 1_000;
        let corners = [
            (min_lon, min_lat),
            (max_lon, min_lat),
            (max_lon, max_lat),
            (min_lon, max_lat),
        ];
        let mut node_ids = Vec::new();
        for (i, &(lon, lat)) in corners.iter().enumerate() {
            let node_id = base + i as i64;
            self = self.node(node_id, lon, lat);
            node_ids.push(node_id);
        }
        node_ids.push(base);
        self = self.way(base + 10, &node_ids);
        let members = vec![RelMember {
            element: OsmElement::new(base + 10, ElementKind::Way, Category::Unknown),
            role: ROLE_OUTER,
        }];
        self.world.rel_members.insert(relation_id, members);
        self.world.rel_names.insert(relation_id, name.into());
        self.world
            .names
            .insert(name, OsmElement::new(relation_id, ElementKind::Relation, Category::PlaceLargeArea));
        self.regions.push((relation_id, name.to_string(), admin_level));
        self
    }

    pub fn scb(mut self, code: i32, relation_id: i64) -> Self {
        self.world.admin.insert_scb(code, relation_id);
        self
    }

    pub fn build(mut self) -> World {
        for (relation_id, name, admin_level) in &self.regions {
            self.world.admin.register_name(name, *admin_level, *relation_id);
        }
        self.world.admin.sort_names();
        let region_ids: Vec<i64> = self
            .regions
            .iter()
            .map(|(id, _, _)| *id)
            .chain(self.world.admin.scb_relation_ids().collect::<Vec<_>>())
            .collect();
        for relation_id in region_ids {
            if let Some(members) = self.world.rel_members.get(relation_id).cloned() {
                self.world
                    .admin
                    .assemble(relation_id, &members, &self.world.way_nodes, &self.world.coords);
            }
        }
        self.world
            .roads
            .repair_unlabeled(&self.world.admin, &self.world.way_nodes, &self.world.coords);
        self.world
    }
}
