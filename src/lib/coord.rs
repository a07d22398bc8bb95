use serde::{Deserialize, Serialize};

/// A position on the integer decimeter grid. `(0, 0)` marks an invalid or
/// unset coordinate; valid coordinates always have positive components as
/// the grid is anchored south-west of the covered region.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const INVALID: Coord = Coord { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Coord { x, y }
    }

    pub fn is_valid(self) -> bool {
        self.x > 0 && self.y > 0
    }

    /// Fast Euclidean distance in meters straight on the grid. Off by a few
    /// percent in the south of the grid and up to ~20 % in the far north;
    /// use [`Grid::distance_meters`] where accuracy matters.
    pub fn grid_distance(a: Coord, b: Coord) -> i64 {
        if a == b {
            return 0;
        }
        let dx = (i64::from(a.x - b.x).abs() + 5) / 10;
        let dy = (i64::from(a.y - b.y).abs() + 5) / 10;
        ((dx * dx + dy * dy) as f64).sqrt().round() as i64
    }

    /// Squared variant of [`Coord::grid_distance`], avoiding the square
    /// root in hot comparison loops.
    pub fn grid_distance_sq(a: Coord, b: Coord) -> i64 {
        if a == b {
            return 0;
        }
        let dx = (i64::from(a.x - b.x).abs() + 5) / 10;
        let dy = (i64::from(a.y - b.y).abs() + 5) / 10;
        dx * dx + dy * dy
    }
}

/// Meters of arc per degree on the unit sphere, times 60 minutes.
const METERS_PER_DEGREE: f64 = 60.0 * 1853.1596;

/// The equirectangular decimeter grid the indices work on. Anchored at the
/// region's south-west corner; the degree-to-decimeter factors are part of
/// the deployment configuration, not of the algorithmics.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct Grid {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    /// Decimeters per degree of longitude, evaluated at the reference
    /// latitude of the region.
    pub dm_per_lon_degree: f64,
    /// Decimeters per degree of latitude.
    pub dm_per_lat_degree: f64,
}

impl Grid {
    /// Grid covering Sweden, scaled at N 60 (just north of Uppsala).
    /// 26.8 degrees of longitude and 17.7 degrees of latitude both stay
    /// well below 2^31 decimeters, so coordinates fit in `i32`.
    pub fn sweden() -> Self {
        Grid {
            min_lon: 4.4,
            min_lat: 53.8,
            max_lon: 31.2,
            max_lat: 71.5,
            dm_per_lon_degree: 556_597.5,
            dm_per_lat_degree: 1_113_195.0,
        }
    }

    pub fn coord(&self, lon: f64, lat: f64) -> Coord {
        Coord {
            x: ((lon - self.min_lon) * self.dm_per_lon_degree + 0.5) as i32,
            y: ((lat - self.min_lat) * self.dm_per_lat_degree + 0.5) as i32,
        }
    }

    pub fn lonlat(&self, c: Coord) -> (f64, f64) {
        (
            (f64::from(c.x) - 0.5) / self.dm_per_lon_degree + self.min_lon,
            (f64::from(c.y) - 0.5) / self.dm_per_lat_degree + self.min_lat,
        )
    }

    /// Great-circle distance in meters via the spherical law of cosines.
    /// Roughly half the speed of [`Coord::grid_distance`] but accurate at
    /// any latitude.
    pub fn distance_meters(&self, a: Coord, b: Coord) -> i64 {
        if a == b {
            return 0;
        }
        let (lon_a, lat_a) = self.lonlat(a);
        let (lon_b, lat_b) = self.lonlat(b);
        let theta = (lon_a - lon_b).to_radians();
        let lat_a = lat_a.to_radians();
        let lat_b = lat_b.to_radians();
        let cosine = lat_a.sin() * lat_b.sin() + lat_a.cos() * lat_b.cos() * theta.cos();
        // Guard against acos of 1 + epsilon on near-identical coordinates.
        let angle = cosine.min(1.0).max(-1.0).acos().to_degrees();
        (angle * METERS_PER_DEGREE).round() as i64
    }
}

impl Default for Grid {
    fn default() -> Self {
        Grid::sweden()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::algorithm::haversine_distance::HaversineDistance;
    use geo::Point;

    #[test]
    fn lonlat_round_trip_within_one_decimeter() {
        let grid = Grid::sweden();
        for &(lon, lat) in &[(14.16, 57.78), (17.63, 59.86), (11.97, 57.70), (20.22, 67.85)] {
            let c = grid.coord(lon, lat);
            let (lon2, lat2) = grid.lonlat(c);
            let c2 = grid.coord(lon2, lat2);
            assert!((c.x - c2.x).abs() <= 1, "x drifted for {} {}", lon, lat);
            assert!((c.y - c2.y).abs() <= 1, "y drifted for {} {}", lon, lat);
        }
    }

    #[test]
    fn geodesic_distance_is_symmetric_and_zero_on_self() {
        let grid = Grid::sweden();
        let a = grid.coord(14.16, 57.78);
        let b = grid.coord(17.63, 59.86);
        assert_eq!(grid.distance_meters(a, a), 0);
        assert_eq!(grid.distance_meters(a, b), grid.distance_meters(b, a));
    }

    #[test]
    fn geodesic_distance_agrees_with_haversine() {
        let grid = Grid::sweden();
        let pairs = [
            ((14.16, 57.78), (17.63, 59.86)),
            ((11.97, 57.70), (18.07, 59.33)),
            ((13.0, 55.6), (20.26, 67.86)),
        ];
        for ((lon_a, lat_a), (lon_b, lat_b)) in pairs.iter() {
            let ours = grid.distance_meters(grid.coord(*lon_a, *lat_a), grid.coord(*lon_b, *lat_b));
            let reference =
                Point::new(*lon_a, *lat_a).haversine_distance(&Point::new(*lon_b, *lat_b));
            assert_relative_eq!(ours as f64, reference, max_relative = 0.01);
        }
    }

    #[test]
    fn grid_distance_close_to_geodesic_in_the_south() {
        let grid = Grid::sweden();
        let a = grid.coord(13.0, 55.6);
        let b = grid.coord(13.2, 55.7);
        let fast = Coord::grid_distance(a, b) as f64;
        let exact = grid.distance_meters(a, b) as f64;
        let error = (fast - exact).abs() / exact;
        assert!(error < 0.1, "grid error {} too large", error);
    }

    #[test]
    fn squared_distance_matches_distance() {
        let a = Coord::new(1_000, 2_000);
        let b = Coord::new(4_000, 6_000);
        let d = Coord::grid_distance(a, b);
        let sq = Coord::grid_distance_sq(a, b);
        assert_eq!(d, (sq as f64).sqrt().round() as i64);
        assert_eq!(Coord::grid_distance_sq(a, a), 0);
    }

    #[test]
    fn origin_is_invalid() {
        assert!(!Coord::INVALID.is_valid());
        assert!(!Coord::new(0, 5).is_valid());
        assert!(Coord::new(1, 1).is_valid());
    }
}
