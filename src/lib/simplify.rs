use crate::coord::Coord;
use crate::idstore::IdStore;
use crate::items::WayNodes;
use log::warn;
use rustc_hash::FxHashMap;
use std::sync::mpsc::Receiver;

/// Squared corridor width for Ramer-Douglas-Peucker: nodes within 2 m of
/// the spanning segment are candidates for removal.
pub const EPSILON_SQ: i64 = 400;

/// Bound of the way queue between the PBF producer and the simplifier
/// consumer; a full queue suspends the producer in `send`.
pub const QUEUE_CAPACITY: usize = 1 << 12;

/// A way as read from the extract, before simplification.
pub struct RawWay {
    pub id: i64,
    pub nodes: Vec<i64>,
}

/// Squared grid distance from `p` to the segment spanning `a`..`b`, in
/// decimeters squared.
fn segment_distance_sq(a: Coord, p: Coord, b: Coord) -> i64 {
    let dx = i64::from(b.x - a.x);
    let dy = i64::from(b.y - a.y);
    if dx == 0 && dy == 0 {
        let px = i64::from(a.x - p.x);
        let py = i64::from(a.y - p.y);
        return px * px + py * py;
    }
    let len_sq = dx * dx + dy * dy;
    let t = ((i64::from(p.x - a.x) * dx + i64::from(p.y - a.y) * dy) as f64) / len_sq as f64;
    if t < 0.0 {
        let px = i64::from(a.x - p.x);
        let py = i64::from(a.y - p.y);
        px * px + py * py
    } else if t > 1.0 {
        let px = i64::from(b.x - p.x);
        let py = i64::from(b.y - p.y);
        px * px + py * py
    } else {
        let x = i64::from(a.x) + (t * dx as f64 + 0.5).floor() as i64;
        let y = i64::from(a.y) + (t * dy as f64 + 0.5).floor() as i64;
        let px = x - i64::from(p.x);
        let py = y - i64::from(p.y);
        px * px + py * py
    }
}

/// Ramer-Douglas-Peucker over node ids. Only nodes with a zero reference
/// counter may be removed; endpoints and referenced (pinned) nodes always
/// survive. Nodes without a known coordinate contribute distance zero and
/// are treated like any other removable node.
pub fn ramer_douglas_peucker(
    nodes: &[i64],
    coords: &FxHashMap<i64, Coord>,
    counters: &FxHashMap<i64, u16>,
) -> Vec<i64> {
    if nodes.len() < 2 {
        return nodes.to_vec();
    }
    let mut removed = vec![false; nodes.len()];
    let mut stack = vec![(0usize, nodes.len() - 1)];

    while let Some((a, b)) = stack.pop() {
        let mut dmax = -1i64;
        let mut dnode = 0usize;
        for i in a + 1..b {
            if removed[i] {
                continue;
            }
            let dist = match (
                coords.get(&nodes[a]),
                coords.get(&nodes[i]),
                coords.get(&nodes[b]),
            ) {
                (Some(&ca), Some(&ci), Some(&cb)) => segment_distance_sq(ca, ci, cb),
                _ => 0,
            };
            if dist > dmax {
                dmax = dist;
                dnode = i;
            }
        }
        if dmax > EPSILON_SQ {
            stack.push((a, dnode));
            stack.push((dnode, b));
        } else {
            for i in a + 1..b {
                if counters.get(&nodes[i]).copied().unwrap_or(0) == 0 {
                    removed[i] = true;
                }
            }
        }
    }

    nodes
        .iter()
        .zip(removed.iter())
        .filter(|(_, &gone)| !gone)
        .map(|(&id, _)| id)
        .collect()
}

/// Consumer loop: drain the way queue, simplify, pin the surviving nodes,
/// and record the polylines. Returns once all producers hung up and the
/// queue is empty.
pub fn run(
    rx: Receiver<RawWay>,
    coords: &FxHashMap<i64, Coord>,
    counters: &mut FxHashMap<i64, u16>,
    way_nodes: &mut IdStore<WayNodes>,
) {
    for way in rx {
        if way.nodes.len() < 2 {
            warn!("way {} has only {} node(s)", way.id, way.nodes.len());
            continue;
        }
        if way.nodes.iter().any(|id| !coords.contains_key(id)) {
            // Incomplete extract: keep the geometry as-is so containment
            // tests over other nodes still work.
            warn!("way {} references nodes without coordinates", way.id);
            way_nodes.insert(way.id, way.nodes);
            continue;
        }
        let kept = ramer_douglas_peucker(&way.nodes, coords, counters);
        if kept.len() < 2 {
            warn!("way {} simplified to fewer than two nodes", way.id);
            continue;
        }
        for &node in &kept {
            let counter = counters.entry(node).or_insert(0);
            *counter = counter.saturating_add(1);
        }
        way_nodes.insert(way.id, kept);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    fn coords_of(points: &[(i64, i32, i32)]) -> FxHashMap<i64, Coord> {
        points
            .iter()
            .map(|&(id, x, y)| (id, Coord::new(x, y)))
            .collect()
    }

    #[test]
    fn collinear_nodes_collapse_to_endpoints() {
        let coords = coords_of(&[(1, 100, 100), (2, 200, 101), (3, 300, 100), (4, 400, 100)]);
        let counters = FxHashMap::default();
        let kept = ramer_douglas_peucker(&[1, 2, 3, 4], &coords, &counters);
        assert_eq!(kept, vec![1, 4]);
    }

    #[test]
    fn corners_outside_the_corridor_survive() {
        // 2 sits 50 m off the 1-3 segment, far beyond the 2 m corridor.
        let coords = coords_of(&[(1, 100, 100), (2, 300, 600), (3, 500, 100)]);
        let counters = FxHashMap::default();
        let kept = ramer_douglas_peucker(&[1, 2, 3], &coords, &counters);
        assert_eq!(kept, vec![1, 2, 3]);
    }

    #[test]
    fn pinned_nodes_survive_simplification() {
        let coords = coords_of(&[(1, 100, 100), (2, 200, 100), (3, 300, 100)]);
        let mut counters = FxHashMap::default();
        counters.insert(2i64, 1u16);
        let kept = ramer_douglas_peucker(&[1, 2, 3], &coords, &counters);
        assert_eq!(kept, vec![1, 2, 3]);
    }

    #[test]
    fn consumer_records_simplified_ways_and_pins_nodes() {
        let coords = coords_of(&[(1, 100, 100), (2, 200, 100), (3, 300, 100)]);
        let mut counters = FxHashMap::default();
        let mut way_nodes = IdStore::new();

        let (tx, rx) = sync_channel(QUEUE_CAPACITY);
        tx.send(RawWay {
            id: 77,
            nodes: vec![1, 2, 3],
        })
        .unwrap();
        tx.send(RawWay {
            id: 78,
            nodes: vec![3],
        })
        .unwrap();
        drop(tx);
        run(rx, &coords, &mut counters, &mut way_nodes);

        assert_eq!(way_nodes.get(77), Some(&vec![1, 3]));
        assert!(way_nodes.get(78).is_none());
        assert_eq!(counters.get(&1).copied(), Some(1));
        assert_eq!(counters.get(&3).copied(), Some(1));
        assert!(counters.get(&2).is_none());
    }

    #[test]
    fn ways_with_unknown_nodes_are_kept_raw() {
        let coords = coords_of(&[(1, 100, 100), (3, 300, 100)]);
        let mut counters = FxHashMap::default();
        let mut way_nodes = IdStore::new();

        let (tx, rx) = sync_channel(4);
        tx.send(RawWay {
            id: 9,
            nodes: vec![1, 2, 3],
        })
        .unwrap();
        drop(tx);
        run(rx, &coords, &mut counters, &mut way_nodes);

        assert_eq!(way_nodes.get(9), Some(&vec![1, 2, 3]));
    }
}
