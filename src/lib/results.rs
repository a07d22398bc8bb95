use crate::coord::Coord;
use crate::items::SearchResult;
use std::cmp::Ordering;

/// Merge matcher outputs into the final ranked list: results within
/// `duplicate_proximity_m` meters of a strictly better result are dropped
/// (equal qualities keep both), the rest is sorted by quality and cut to
/// `limit`.
pub fn aggregate(
    mut results: Vec<SearchResult>,
    duplicate_proximity_m: i32,
    limit: usize,
) -> Vec<SearchResult> {
    if duplicate_proximity_m > 0 && results.len() > 1 {
        let threshold_sq = i64::from(duplicate_proximity_m) * i64::from(duplicate_proximity_m);
        let mut keep = vec![true; results.len()];
        for i in 0..results.len() {
            if !keep[i] {
                continue;
            }
            for j in 0..results.len() {
                if i == j || !keep[j] {
                    continue;
                }
                if results[i].quality < results[j].quality
                    && Coord::grid_distance_sq(results[i].coord, results[j].coord) < threshold_sq
                {
                    keep[i] = false;
                    break;
                }
            }
        }
        let mut kept = keep.iter();
        results.retain(|_| *kept.next().unwrap_or(&true));
    }

    results.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(x: i32, y: i32, quality: f64) -> SearchResult {
        SearchResult::new(Coord::new(x, y), quality, format!("q={}", quality))
    }

    #[test]
    fn sorts_by_quality_descending() {
        let results = aggregate(
            vec![result(1_000, 1_000, 0.3), result(900_000, 900_000, 0.9)],
            0,
            10,
        );
        assert_eq!(results[0].quality, 0.9);
        assert_eq!(results[1].quality, 0.3);
    }

    #[test]
    fn nearby_weaker_results_are_dropped() {
        let results = aggregate(
            vec![
                result(10_000, 10_000, 0.9),
                // ~20 m away, weaker: dropped.
                result(10_150, 10_150, 0.5),
                // far away, weaker: kept.
                result(900_000, 900_000, 0.5),
            ],
            1_000,
            10,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].quality, 0.9);
        assert_eq!(results[1].coord, Coord::new(900_000, 900_000));
    }

    #[test]
    fn equal_quality_neighbours_both_survive() {
        let results = aggregate(
            vec![result(10_000, 10_000, 0.7), result(10_100, 10_100, 0.7)],
            1_000,
            10,
        );
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn zero_proximity_disables_deduplication() {
        let results = aggregate(
            vec![result(10_000, 10_000, 0.9), result(10_010, 10_010, 0.1)],
            0,
            10,
        );
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn truncates_to_limit() {
        let many: Vec<SearchResult> = (0..30)
            .map(|i| result(10_000 + i * 10_000, 10_000, 0.5 + f64::from(i) / 100.0))
            .collect();
        let results = aggregate(many, 0, 20);
        assert_eq!(results.len(), 20);
    }

    #[test]
    fn empty_input_is_fine() {
        assert!(aggregate(Vec::new(), 250, 20).is_empty());
    }
}
