//! Geo-grid generation.

use gridrank_common::geo::{miles_per_degree_lng, round_coord, MILES_PER_DEGREE_LAT};

pub use gridrank_common::types::GridCell;

/// Grid sizes a scan may use. The orchestrator rejects everything else
/// before this module is reached.
pub const VALID_GRID_SIZES: &[i32] = &[3, 5, 7, 9];

/// Build a `grid_size` × `grid_size` grid of coordinates covering a square
/// of side `2 × radius_miles` centered on the given point. Row 0 is the
/// north edge, column 0 the west edge; coordinates round to seven decimals.
pub fn generate(
    center_lat: f64,
    center_lng: f64,
    radius_miles: f64,
    grid_size: i32,
) -> Vec<GridCell> {
    let steps = (grid_size - 1).max(1) as f64;

    let lat_half_span = radius_miles / MILES_PER_DEGREE_LAT;
    let lng_half_span = radius_miles / miles_per_degree_lng(center_lat);

    let lat_step = (2.0 * lat_half_span) / steps;
    let lng_step = (2.0 * lng_half_span) / steps;

    let north = center_lat + lat_half_span;
    let west = center_lng - lng_half_span;

    let mut cells = Vec::with_capacity((grid_size * grid_size) as usize);
    for row in 0..grid_size {
        for col in 0..grid_size {
            cells.push(GridCell {
                row,
                col,
                lat: round_coord(north - row as f64 * lat_step),
                lng: round_coord(west + col as f64 * lng_step),
            });
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_n_squared_cells() {
        for &n in VALID_GRID_SIZES {
            let cells = generate(26.4615, -80.0728, 1.0, n);
            assert_eq!(cells.len(), (n * n) as usize);
        }
    }

    #[test]
    fn row_zero_is_northernmost_col_zero_is_westernmost() {
        let cells = generate(26.4615, -80.0728, 2.0, 5);
        let max_lat = cells.iter().map(|c| c.lat).fold(f64::MIN, f64::max);
        let min_lng = cells.iter().map(|c| c.lng).fold(f64::MAX, f64::min);

        for c in &cells {
            if c.row == 0 {
                assert_eq!(c.lat, max_lat, "row 0 not on the north edge");
            }
            if c.col == 0 {
                assert_eq!(c.lng, min_lng, "col 0 not on the west edge");
            }
        }
    }

    #[test]
    fn north_south_span_is_two_radii() {
        let radius = 3.0;
        let cells = generate(40.0, -75.0, radius, 7);
        let max_lat = cells.iter().map(|c| c.lat).fold(f64::MIN, f64::max);
        let min_lat = cells.iter().map(|c| c.lat).fold(f64::MAX, f64::min);
        let expected = 2.0 * radius / MILES_PER_DEGREE_LAT;
        assert!(
            ((max_lat - min_lat) - expected).abs() < 1e-6,
            "span {} != {expected}",
            max_lat - min_lat
        );
    }

    #[test]
    fn grid_is_centered() {
        let cells = generate(26.4615, -80.0728, 1.0, 3);
        let center = cells
            .iter()
            .find(|c| c.row == 1 && c.col == 1)
            .expect("center cell");
        assert!((center.lat - 26.4615).abs() < 1e-6);
        assert!((center.lng - -80.0728).abs() < 1e-6);
    }

    #[test]
    fn rows_and_cols_enumerate_in_order() {
        let cells = generate(26.4615, -80.0728, 1.0, 3);
        let expected: Vec<(i32, i32)> = (0..3)
            .flat_map(|r| (0..3).map(move |c| (r, c)))
            .collect();
        let actual: Vec<(i32, i32)> = cells.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn longitude_span_widens_with_latitude() {
        let south = generate(25.0, -80.0, 1.0, 3);
        let north = generate(45.0, -80.0, 1.0, 3);
        let span = |cells: &[GridCell]| {
            let max = cells.iter().map(|c| c.lng).fold(f64::MIN, f64::max);
            let min = cells.iter().map(|c| c.lng).fold(f64::MAX, f64::min);
            max - min
        };
        assert!(span(&north) > span(&south));
    }
}
