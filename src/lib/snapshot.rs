use crate::admin::{AdminIndex, RelMember};
use crate::coord::Grid;
use crate::error::{Error, Result};
use crate::idstore::{CoordStore, IdStore};
use crate::items::{Name, WayNodes};
use crate::roads::RoadIndex;
use crate::texttree::TextTree;
use crate::tokenizer::Tokenizer;
use crate::World;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const MAGIC: &[u8; 4] = b"otcs";
const VERSION: u8 = 1;

const KIND_TEXTTREE: u8 = 1;
const KIND_COORDS: u8 = 2;
const KIND_NODE_NAMES: u8 = 3;
const KIND_WAY_NAMES: u8 = 4;
const KIND_REL_NAMES: u8 = 5;
const KIND_WAY_NODES: u8 = 6;
const KIND_REL_MEMBERS: u8 = 7;
const KIND_SWEDEN: u8 = 8;

/// The eight snapshot files: suffix and whether the payload is gzipped.
const FILES: [(&str, bool); 8] = [
    ("texttree", false),
    ("n2c", true),
    ("nn", true),
    ("wn", true),
    ("rn", true),
    ("w2n", true),
    ("relmem", false),
    ("sweden", true),
];

/// The grid, admin regions, roads, and region names travel together: they
/// are only meaningful with the other indices resident.
#[derive(Serialize)]
struct SwedenSnapshotRef<'a> {
    grid: &'a Grid,
    admin: &'a AdminIndex,
    roads: &'a RoadIndex,
}

#[derive(serde::Deserialize)]
struct SwedenSnapshot {
    grid: Grid,
    admin: AdminIndex,
    roads: RoadIndex,
}

fn snapshot_path(dir: &Path, mapname: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{}.{}", mapname, suffix))
}

/// A snapshot set is usable when every file exists and holds more than a
/// bare header.
pub fn present(dir: &Path, mapname: &str) -> bool {
    FILES.iter().all(|(suffix, _)| {
        fs::metadata(snapshot_path(dir, mapname, suffix))
            .map(|meta| meta.len() >= 16)
            .unwrap_or(false)
    })
}

fn write_snapshot<T: Serialize + ?Sized>(
    path: &Path,
    kind: u8,
    value: &T,
    compressed: bool,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC)?;
    writer.write_all(&[VERSION, kind])?;
    if compressed {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        bincode::serialize_into(&mut encoder, value)?;
        encoder.finish()?.flush()?;
    } else {
        bincode::serialize_into(&mut writer, value)?;
        writer.flush()?;
    }
    Ok(())
}

fn read_snapshot<T: DeserializeOwned>(path: &Path, kind: u8, compressed: bool) -> Result<T> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut header = [0u8; 6];
    reader.read_exact(&mut header)?;
    if &header[..4] != MAGIC {
        return Err(Error::Snapshot(format!("{}: not a snapshot file", path.display())));
    }
    if header[4] != VERSION {
        return Err(Error::Snapshot(format!(
            "{}: snapshot version {} not supported",
            path.display(),
            header[4]
        )));
    }
    if header[5] != kind {
        return Err(Error::Snapshot(format!(
            "{}: unexpected snapshot content {}",
            path.display(),
            header[5]
        )));
    }
    let value = if compressed {
        bincode::deserialize_from(GzDecoder::new(reader))?
    } else {
        bincode::deserialize_from(reader)?
    };
    Ok(value)
}

/// Write all eight snapshot files, one task per file.
pub fn save(world: &World, dir: &Path, mapname: &str) -> Result<()> {
    info!("saving snapshots to {}", dir.display());
    let errors: Mutex<Vec<Error>> = Mutex::new(Vec::new());
    let record = |result: Result<()>| {
        if let Err(error) = result {
            errors.lock().expect("snapshot error lock").push(error);
        }
    };
    let sweden = SwedenSnapshotRef {
        grid: &world.grid,
        admin: &world.admin,
        roads: &world.roads,
    };
    rayon::scope(|s| {
        s.spawn(|_| {
            record(write_snapshot(
                &snapshot_path(dir, mapname, "texttree"),
                KIND_TEXTTREE,
                &world.names,
                false,
            ))
        });
        s.spawn(|_| {
            record(write_snapshot(
                &snapshot_path(dir, mapname, "n2c"),
                KIND_COORDS,
                &world.coords,
                true,
            ))
        });
        s.spawn(|_| {
            record(write_snapshot(
                &snapshot_path(dir, mapname, "nn"),
                KIND_NODE_NAMES,
                &world.node_names,
                true,
            ))
        });
        s.spawn(|_| {
            record(write_snapshot(
                &snapshot_path(dir, mapname, "wn"),
                KIND_WAY_NAMES,
                &world.way_names,
                true,
            ))
        });
        s.spawn(|_| {
            record(write_snapshot(
                &snapshot_path(dir, mapname, "rn"),
                KIND_REL_NAMES,
                &world.rel_names,
                true,
            ))
        });
        s.spawn(|_| {
            record(write_snapshot(
                &snapshot_path(dir, mapname, "w2n"),
                KIND_WAY_NODES,
                &world.way_nodes,
                true,
            ))
        });
        s.spawn(|_| {
            record(write_snapshot(
                &snapshot_path(dir, mapname, "relmem"),
                KIND_REL_MEMBERS,
                &world.rel_members,
                false,
            ))
        });
        s.spawn(|_| {
            record(write_snapshot(
                &snapshot_path(dir, mapname, "sweden"),
                KIND_SWEDEN,
                &sweden,
                true,
            ))
        });
    });
    match errors.into_inner().expect("snapshot error lock").pop() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn taken<T>(slot: Option<Result<T>>, what: &str) -> Result<T> {
    slot.unwrap_or_else(|| Err(Error::Snapshot(format!("{} was not loaded", what))))
}

/// Load all snapshot files. The first seven load concurrently; the region
/// and road file is read last since it describes the others.
pub fn load(dir: &Path, mapname: &str, tokenizer: Tokenizer) -> Result<World> {
    info!("loading snapshots from {}", dir.display());
    let mut names: Option<Result<TextTree>> = None;
    let mut coords: Option<Result<CoordStore>> = None;
    let mut node_names: Option<Result<IdStore<Name>>> = None;
    let mut way_names: Option<Result<IdStore<Name>>> = None;
    let mut rel_names: Option<Result<IdStore<Name>>> = None;
    let mut way_nodes: Option<Result<IdStore<WayNodes>>> = None;
    let mut rel_members: Option<Result<IdStore<Vec<RelMember>>>> = None;

    rayon::scope(|s| {
        s.spawn(|_| {
            names = Some(read_snapshot(
                &snapshot_path(dir, mapname, "texttree"),
                KIND_TEXTTREE,
                false,
            ))
        });
        s.spawn(|_| {
            coords = Some(read_snapshot(
                &snapshot_path(dir, mapname, "n2c"),
                KIND_COORDS,
                true,
            ))
        });
        s.spawn(|_| {
            node_names = Some(read_snapshot(
                &snapshot_path(dir, mapname, "nn"),
                KIND_NODE_NAMES,
                true,
            ))
        });
        s.spawn(|_| {
            way_names = Some(read_snapshot(
                &snapshot_path(dir, mapname, "wn"),
                KIND_WAY_NAMES,
                true,
            ))
        });
        s.spawn(|_| {
            rel_names = Some(read_snapshot(
                &snapshot_path(dir, mapname, "rn"),
                KIND_REL_NAMES,
                true,
            ))
        });
        s.spawn(|_| {
            way_nodes = Some(read_snapshot(
                &snapshot_path(dir, mapname, "w2n"),
                KIND_WAY_NODES,
                true,
            ))
        });
        s.spawn(|_| {
            rel_members = Some(read_snapshot(
                &snapshot_path(dir, mapname, "relmem"),
                KIND_REL_MEMBERS,
                false,
            ))
        });
    });

    let sweden: SwedenSnapshot =
        read_snapshot(&snapshot_path(dir, mapname, "sweden"), KIND_SWEDEN, true)?;

    let mut world = World::empty(sweden.grid, tokenizer);
    world.names = taken(names, "name index")?;
    world.coords = taken(coords, "node coordinates")?;
    world.node_names = taken(node_names, "node names")?;
    world.way_names = taken(way_names, "way names")?;
    world.rel_names = taken(rel_names, "relation names")?;
    world.way_nodes = taken(way_nodes, "way nodes")?;
    world.rel_members = taken(rel_members, "relation members")?;
    world.admin = sweden.admin;
    world.roads = sweden.roads;
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::Category;
    use crate::test_helpers::WorldBuilder;

    fn sample_world() -> World {
        WorldBuilder::new()
            .named_node(1, 17.63, 59.86, "Uppsala", Category::PlaceLarge)
            .node(2, 14.10, 57.75)
            .node(3, 14.20, 57.80)
            .road_way(10, &[2, 3], "E 4")
            .square_region(500, "Kiruna kommun", 7, 20.0, 67.6, 20.6, 68.0)
            .build()
    }

    #[test]
    fn snapshot_files_round_trip() {
        let world = sample_world();
        let dir = tempfile::tempdir().expect("tempdir");
        save(&world, dir.path(), "testmap").expect("save");

        assert!(present(dir.path(), "testmap"));

        let stopwords = Tokenizer::from_words(vec!["och".to_string()]);
        let loaded = load(dir.path(), "testmap", stopwords).expect("load");
        assert_eq!(loaded.coords.len(), world.coords.len());
        assert_eq!(loaded.names.len(), world.names.len());
        assert_eq!(
            loaded.names.retrieve("uppsala"),
            world.names.retrieve("uppsala")
        );
        assert!(loaded.admin.contains(500, loaded.grid.coord(20.3, 67.8)));
    }

    #[test]
    fn missing_or_stub_files_fail_the_presence_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!present(dir.path(), "testmap"));
        for (suffix, _) in &FILES {
            fs::write(snapshot_path(dir.path(), "testmap", suffix), b"tiny").expect("write stub");
        }
        assert!(!present(dir.path(), "testmap"));
    }

    #[test]
    fn wrong_kind_byte_is_rejected() {
        let world = sample_world();
        let dir = tempfile::tempdir().expect("tempdir");
        save(&world, dir.path(), "testmap").expect("save");
        // The coordinate file does not deserialize as the text tree.
        let coords = snapshot_path(dir.path(), "testmap", "n2c");
        let tree = snapshot_path(dir.path(), "testmap", "texttree");
        fs::copy(&coords, &tree).expect("copy");
        let stopwords = Tokenizer::from_words(Vec::new());
        assert!(load(dir.path(), "testmap", stopwords).is_err());
    }
}
