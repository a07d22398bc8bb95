use crate::admin::{AdminIndex, RelMember, ROLE_INNER, ROLE_OUTER};
use crate::coord::Grid;
use crate::error::Result;
use crate::idstore::{CoordStore, IdStore};
use crate::items::{Category, ElementKind, Name, OsmElement};
use crate::roads::RoadIndex;
use crate::simplify::{self, RawWay};
use crate::texttree::TextTree;
use crate::tokenizer::Tokenizer;
use crate::World;
use log::{info, warn};
use osmpbfreader::{OsmId, OsmObj, OsmPbfReader, Relation, Tags};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::mpsc::sync_channel;
use std::thread;

/// Relations in the extract that describe things outside the covered
/// country, e.g. international route relations clipped at the border.
const RELATION_BLACKLIST: &[i64] = &[2545969, 3189514, 5518156, 5756777, 5794315, 5794316];

/// Road `ref` values are only trusted on these highway classes.
const ROAD_REF_HIGHWAYS: &[&str] = &[
    "motorway",
    "trunk",
    "primary",
    "secondary",
    "tertiary",
    "unclassified",
    "residential",
    "service",
];

/// Language codes whose `name:<code>` tags are not useful for Swedish
/// queries. Everything else (e.g. `name:sv`, `name:fi`) is indexed.
const NAME_LANGUAGE_BLACKLIST: &[&str] = &[
    "ab", "ace", "af", "ak", "als", "am", "an", "ang", "ar", "arc", "arz", "ast", "ay", "az",
    "ba", "bar", "bat-smg", "bcl", "be", "be-tarask", "bg", "bi", "bm", "bn", "bo", "bpy", "br",
    "bs", "bxr", "ca", "cdo", "ce", "ceb", "chr", "chy", "ckb", "co", "crh", "cs", "csb", "cu",
    "cv", "cy", "da", "de", "diq", "dsb", "dv", "dz", "ee", "el", "en", "eo", "es", "et", "eu",
    "ext", "fa", "ff", "fi", "fiu-vro", "fo", "fr", "frp", "frr", "fur", "fy", "ga", "gag",
    "gan", "gd", "gl", "gn", "gu", "gv", "ha", "hak", "haw", "he", "hi", "hif", "hr", "hsb",
    "ht", "hu", "hy", "ia", "id", "ie", "ig", "ilo", "io", "is", "it", "iu", "ja", "jbo", "jv",
    "ka", "kaa", "kab", "kbd", "kg", "ki", "kk", "kl", "km", "kn", "ko", "koi", "krc", "ks",
    "ksh", "ku", "kv", "kw", "ky", "la", "lad", "lb", "lez", "lg", "li", "lij", "lmo", "ln",
    "lo", "lt", "ltg", "lv", "mdf", "mg", "mhr", "mi", "mk", "ml", "mn", "mr", "mrj", "ms",
    "mt", "my", "myv", "mzn", "na", "nah", "nan", "nap", "nb", "nds", "nds-nl", "ne", "new",
    "nl", "nn", "no", "nov", "nrm", "nv", "oc", "om", "or", "os", "pa", "pag", "pam", "pap",
    "pcd", "pdc", "pih", "pl", "pms", "pnb", "pnt", "ps", "pt", "qu", "rm", "rmy", "rn", "ro",
    "roa-rup", "roa-tara", "ru", "rue", "rw", "sa", "sah", "sc", "scn", "sco", "se", "sg", "sh",
    "si", "simple", "sk", "sl", "sm", "sme", "sn", "so", "sq", "sr", "sr-Latn", "srn", "ss",
    "st", "stq", "su", "sw", "szl", "ta", "te", "tet", "tg", "th", "ti", "tk", "tl", "to",
    "tpi", "tr", "ts", "tt", "tw", "tzl", "udm", "ug", "uk", "ur", "uz", "vec", "vep", "vi",
    "vls", "vo", "wa", "war", "wo", "wuu", "xal", "xmf", "yi", "yo", "yue", "za", "zea", "zh",
    "zh-classical", "zh-min-nan", "zh_pinyin", "zh_py", "zh_pyt", "zh-simplified", "zh-yue",
    "zu",
];

fn is_name_key(key: &str) -> bool {
    const BASES: &[&str] = &[
        "name",
        "alt_name",
        "old_name",
        "loc_name",
        "short_name",
        "official_name",
    ];
    BASES.iter().any(|base| {
        key == *base || (key.len() > base.len() && key.starts_with(base) && key.as_bytes()[base.len()] == b':')
    })
}

fn is_foreign_language_name(key: &str) -> bool {
    match key.rsplit(':').next() {
        Some(code) if key.contains(':') => NAME_LANGUAGE_BLACKLIST.contains(&code),
        _ => false,
    }
}

fn collect_names(tags: &Tags) -> BTreeMap<String, String> {
    tags.iter()
        .filter(|(key, _)| is_name_key(key))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Index every usable name of an element and remember the canonical one.
/// The first named sighting of a node pins it against simplification.
fn insert_names(
    names: &mut TextTree,
    name_store: &mut IdStore<Name>,
    coords: Option<&mut CoordStore>,
    id: i64,
    kind: ElementKind,
    category: Category,
    name_set: &BTreeMap<String, String>,
) {
    let element = OsmElement::new(id, kind, category);
    let mut pinned = coords.is_none();
    let mut coords = coords;
    let mut best_name: Option<&str> = None;
    let mut known: Vec<&str> = Vec::new();

    for (key, value) in name_set {
        if value.len() < 2 {
            continue;
        }
        if !pinned {
            if let Some(store) = coords.as_deref_mut() {
                store.pin(id);
            }
            pinned = true;
        }
        if is_foreign_language_name(key) {
            continue;
        }
        if known.contains(&value.as_str()) {
            continue;
        }
        known.push(value);
        if best_name.is_none() || key == "name" {
            best_name = Some(value);
        }
        if !names.insert(value, element) {
            warn!("cannot index {}={} for {}", key, value, element);
        }
    }

    if let Some(best) = best_name {
        name_store.insert(id, best.into());
    }
}

fn node_category(tags: &Tags) -> Category {
    let mut category = Category::Unknown;
    if let Some(place) = tags.get("place") {
        category = match place.as_str() {
            "city" | "municipality" => Category::PlaceLarge,
            "borough" | "suburb" | "town" | "village" => Category::PlaceMedium,
            "quarter" | "neighbourhood" | "hamlet" | "isolated_dwelling" => Category::PlaceSmall,
            "island" => Category::Island,
            _ => category,
        };
    }
    if tags.get("natural").map(|v| v.as_str()) == Some("water") {
        category = Category::Water;
    }
    category
}

fn way_category(tags: &Tags) -> Category {
    let mut category = Category::Unknown;
    if let Some(highway) = tags.get("highway") {
        category = match highway.as_str() {
            "motorway" | "trunk" | "primary" => Category::RoadMajor,
            "secondary" | "tertiary" => Category::RoadMedium,
            "unclassified" | "residential" | "service" => Category::RoadMinor,
            _ => category,
        };
    }
    if tags.contains_key("building") {
        category = Category::Building;
    }
    if tags.get("place").map(|v| v.as_str()) == Some("island") {
        category = Category::Island;
    }
    if tags.get("natural").map(|v| v.as_str()) == Some("water") {
        category = Category::Water;
    }
    category
}

fn relation_category(tags: &Tags) -> Category {
    let mut category = Category::Unknown;
    if tags.contains_key("building") {
        category = Category::Building;
    }
    if tags.get("place").map(|v| v.as_str()) == Some("island") {
        category = Category::Island;
    }
    if tags.get("natural").map(|v| v.as_str()) == Some("water") {
        category = Category::Water;
    }
    if category == Category::Unknown {
        if tags.get("type").map(|v| v.as_str()) == Some("route")
            && tags.get("route").map(|v| v.as_str()) == Some("road")
        {
            category = Category::RoadMajor;
        } else if tags.get("boundary").map(|v| v.as_str()) == Some("administrative") {
            category = Category::PlaceLargeArea;
        }
    }
    category
}

fn register_relation_metadata(admin: &mut AdminIndex, id: i64, tags: &Tags) {
    for scb_key in &["ref:scb", "ref:se:scb"] {
        if let Some(value) = tags.get(*scb_key) {
            match value.parse::<i32>() {
                Ok(code) => admin.insert_scb(code, id),
                Err(_) => warn!("cannot parse SCB code '{}' on relation {}", value, id),
            }
        }
    }
    if let Some(value) = tags.get("ref:nuts:3") {
        match value.strip_prefix("SE").map(str::parse::<i32>) {
            Some(Ok(code)) if code > 0 => admin.insert_nuts3(code, id),
            _ => warn!("cannot parse NUTS-3 code '{}' on relation {}", value, id),
        }
    }

    let boundary = tags.get("boundary").map(|v| v.as_str());
    if boundary == Some("administrative") || boundary == Some("historic") {
        if let (Some(level), Some(name)) = (
            tags.get("admin_level").and_then(|v| v.parse::<u8>().ok()),
            tags.get("name"),
        ) {
            if level > 0 && name.len() > 1 {
                admin.register_name(name, level, id);
            }
        }
    }
}

fn relation_members(relation: &Relation) -> Vec<RelMember> {
    relation
        .refs
        .iter()
        .map(|osm_ref| {
            let element = match osm_ref.member {
                OsmId::Node(id) => OsmElement::new(id.0, ElementKind::Node, Category::Unknown),
                OsmId::Way(id) => OsmElement::new(id.0, ElementKind::Way, Category::Unknown),
                OsmId::Relation(id) => {
                    OsmElement::new(id.0, ElementKind::Relation, Category::Unknown)
                }
            };
            let role = if osm_ref.role == "outer" {
                ROLE_OUTER
            } else if osm_ref.role == "inner" {
                ROLE_INNER
            } else {
                0
            };
            RelMember { element, role }
        })
        .collect()
}

/// Read a PBF extract and build all indices. The file is read twice: first
/// for the nodes, then for ways and relations, with the way simplifier
/// draining a bounded queue on its own thread during the second pass.
pub fn ingest_pbf<P: AsRef<Path>>(path: P, grid: Grid, tokenizer: Tokenizer) -> Result<World> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut pbf = OsmPbfReader::new(BufReader::new(file));

    let mut coords = CoordStore::new();
    let mut names = TextTree::new();
    let mut node_names: IdStore<Name> = IdStore::new();
    let mut way_names: IdStore<Name> = IdStore::new();
    let mut rel_names: IdStore<Name> = IdStore::new();
    let mut way_nodes = IdStore::new();
    let mut rel_members: IdStore<Vec<RelMember>> = IdStore::new();
    let mut admin = AdminIndex::new();
    let mut roads = RoadIndex::new();

    info!("reading nodes from {}", path.display());
    for obj in pbf.iter() {
        let node = match obj? {
            OsmObj::Node(node) => node,
            _ => continue,
        };
        coords.insert(node.id.0, grid.coord(node.lon(), node.lat()));

        let name_set = collect_names(&node.tags);
        if name_set.is_empty() {
            continue;
        }
        let place = node.tags.get("place").map(|v| v.as_str());
        if matches!(place, Some("county") | Some("municipality") | Some("traffic_sign")) {
            // County and municipality nodes double the area features, and a
            // traffic sign points at a location without being there.
            info!(
                "not recording name of {} node {}",
                place.unwrap_or_default(),
                node.id.0
            );
            continue;
        }
        insert_names(
            &mut names,
            &mut node_names,
            Some(&mut coords),
            node.id.0,
            ElementKind::Node,
            node_category(&node.tags),
            &name_set,
        );
    }
    info!("{} node coordinates stored", coords.len());

    pbf.rewind()?;
    info!("reading ways and relations from {}", path.display());

    let (tx, rx) = sync_channel::<RawWay>(simplify::QUEUE_CAPACITY);
    let (coords_map, counters) = coords.split_mut();
    let consumer_way_nodes = &mut way_nodes;
    let producer_result: Result<()> = thread::scope(|scope| {
        scope.spawn(move || simplify::run(rx, coords_map, counters, consumer_way_nodes));

        for obj in pbf.iter() {
            match obj? {
                OsmObj::Node(_) => {}
                OsmObj::Way(way) => {
                    if way.nodes.len() < 2 {
                        warn!("way {} has only {} node(s)", way.id.0, way.nodes.len());
                        continue;
                    }
                    let highway_has_road_ref = way
                        .tags
                        .get("highway")
                        .map(|h| ROAD_REF_HIGHWAYS.contains(&h.as_str()))
                        .unwrap_or(false);
                    if highway_has_road_ref {
                        if let Some(ref_value) = way.tags.get("ref") {
                            roads.insert_ref(way.id.0, ref_value);
                        }
                    }

                    // Hand the way to the simplifier; a full queue blocks
                    // until the consumer catches up.
                    let raw = RawWay {
                        id: way.id.0,
                        nodes: way.nodes.iter().map(|n| n.0).collect(),
                    };
                    if tx.send(raw).is_err() {
                        warn!("way simplifier stopped early");
                    }

                    let name_set = collect_names(&way.tags);
                    if !name_set.is_empty() {
                        insert_names(
                            &mut names,
                            &mut way_names,
                            None,
                            way.id.0,
                            ElementKind::Way,
                            way_category(&way.tags),
                            &name_set,
                        );
                    }
                }
                OsmObj::Relation(relation) => {
                    if RELATION_BLACKLIST.contains(&relation.id.0) {
                        continue;
                    }
                    register_relation_metadata(&mut admin, relation.id.0, &relation.tags);
                    rel_members.insert(relation.id.0, relation_members(&relation));

                    let name_set = collect_names(&relation.tags);
                    if !name_set.is_empty() {
                        insert_names(
                            &mut names,
                            &mut rel_names,
                            None,
                            relation.id.0,
                            ElementKind::Relation,
                            relation_category(&relation.tags),
                            &name_set,
                        );
                    }
                }
            }
        }
        drop(tx);
        Ok(())
    });
    producer_result?;

    info!(
        "{} ways, {} relations, {} name entries",
        way_nodes.len(),
        rel_members.len(),
        names.len()
    );

    admin.sort_names();
    let mut region_ids: Vec<i64> = admin.named_relation_ids();
    region_ids.extend(admin.scb_relation_ids());
    region_ids.extend(admin.nuts3_relation_ids());
    region_ids.sort_unstable();
    region_ids.dedup();
    for relation_id in region_ids {
        match rel_members.get(relation_id) {
            Some(members) => admin.assemble(relation_id, members, &way_nodes, &coords),
            None => info!("administrative relation {} has no stored members", relation_id),
        }
    }
    info!("{} administrative regions assembled", admin.region_count());

    roads.repair_unlabeled(&admin, &way_nodes, &coords);

    let mut world = World::empty(grid, tokenizer);
    world.coords = coords;
    world.names = names;
    world.node_names = node_names;
    world.way_names = way_names;
    world.rel_names = rel_names;
    world.way_nodes = way_nodes;
    world.rel_members = rel_members;
    world.admin = admin;
    world.roads = roads;
    Ok(world)
}
