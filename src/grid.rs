//! Uniform grid spatial index.
//!
//! Maps fixed-degree cells to the region ids whose bounding box intersects
//! them, narrowing containment checks from all regions to the handful near
//! a fix. Cells are fixed in degrees, so their physical size shrinks toward
//! the poles; a known approximation for this domain's target latitudes.
//! Antimeridian and pole wraparound are not handled.

use crate::region::Region;
use geo::{Point, Rect};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Grid cell key: `(floor(lat/size), floor(lon/size))`.
pub type CellKey = (i32, i32);

/// Grid index over region bounding boxes.
///
/// A region occupies every cell its bounding box spans and must be
/// re-indexed (remove with the old definition, add with the new) whenever
/// the box changes. Updates are O(cells spanned); queries are O(candidates)
/// independent of the total region count.
pub struct GridIndex {
    cell_size_deg: f64,
    buckets: FxHashMap<CellKey, FxHashSet<String>>,
    len: usize,
}

impl GridIndex {
    pub fn new(cell_size_deg: f64) -> Self {
        Self {
            cell_size_deg,
            buckets: FxHashMap::default(),
            len: 0,
        }
    }

    /// Index a region into every cell its bounding box spans.
    pub fn add(&mut self, region: &Region) {
        let mut inserted = false;
        for cell in self.cells_for_rect(&region.bounding_box()) {
            inserted |= self
                .buckets
                .entry(cell)
                .or_default()
                .insert(region.id.clone());
        }
        if inserted {
            self.len += 1;
        }
    }

    /// Remove a region, reversing the same cell computation. Must be called
    /// with the definition that was indexed. Empty buckets are dropped.
    pub fn remove(&mut self, region: &Region) {
        let mut removed = false;
        for cell in self.cells_for_rect(&region.bounding_box()) {
            if let Some(bucket) = self.buckets.get_mut(&cell) {
                removed |= bucket.remove(&region.id);
                if bucket.is_empty() {
                    self.buckets.remove(&cell);
                }
            }
        }
        if removed {
            self.len = self.len.saturating_sub(1);
        }
    }

    /// Candidate region ids for a point: the union of the point's own cell
    /// and its 8 neighbors.
    ///
    /// The neighborhood tolerates points exactly on a cell boundary and
    /// circular regions whose true extent pokes slightly past their bounding
    /// cells. May contain false positives, never false negatives.
    pub fn candidates(&self, point: &Point) -> FxHashSet<String> {
        let (row, col) = self.cell_for(point);

        let mut cells: SmallVec<[CellKey; 9]> = SmallVec::new();
        for dr in -1..=1 {
            for dc in -1..=1 {
                cells.push((row + dr, col + dc));
            }
        }

        let mut ids = FxHashSet::default();
        for cell in cells {
            if let Some(bucket) = self.buckets.get(&cell) {
                ids.extend(bucket.iter().cloned());
            }
        }
        ids
    }

    /// Number of indexed regions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of occupied grid buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }

    fn cell_for(&self, point: &Point) -> CellKey {
        (
            (point.y() / self.cell_size_deg).floor() as i32,
            (point.x() / self.cell_size_deg).floor() as i32,
        )
    }

    fn cells_for_rect(&self, rect: &Rect) -> Vec<CellKey> {
        let min_row = (rect.min().y / self.cell_size_deg).floor() as i32;
        let max_row = (rect.max().y / self.cell_size_deg).floor() as i32;
        let min_col = (rect.min().x / self.cell_size_deg).floor() as i32;
        let max_col = (rect.max().x / self.cell_size_deg).floor() as i32;

        let mut cells =
            Vec::with_capacity(((max_row - min_row + 1) * (max_col - min_col + 1)) as usize);
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                cells.push((row, col));
            }
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(id: &str, lon: f64, lat: f64, radius_m: f64) -> Region {
        Region::circle(id, Point::new(lon, lat), radius_m).unwrap()
    }

    #[test]
    fn test_add_and_query() {
        let mut index = GridIndex::new(0.01);
        let region = circle("home", -74.0060, 40.7128, 100.0);

        index.add(&region);
        assert_eq!(index.len(), 1);

        let candidates = index.candidates(&Point::new(-74.0060, 40.7128));
        assert!(candidates.contains("home"));
    }

    #[test]
    fn test_remove_drops_empty_buckets() {
        let mut index = GridIndex::new(0.01);
        let region = circle("r", -74.0, 40.7, 100.0);

        index.add(&region);
        assert!(index.bucket_count() > 0);

        index.remove(&region);
        assert_eq!(index.len(), 0);
        assert_eq!(index.bucket_count(), 0);
        assert!(index.candidates(&Point::new(-74.0, 40.7)).is_empty());
    }

    #[test]
    fn test_cell_boundary_tolerance() {
        let mut index = GridIndex::new(0.01);
        // Region centered just inside one cell.
        let region = circle("edge", -74.0001, 40.7001, 50.0);
        index.add(&region);

        // Query from exactly on the neighboring cell boundary.
        let candidates = index.candidates(&Point::new(-74.00, 40.70));
        assert!(candidates.contains("edge"));
    }

    #[test]
    fn test_large_region_spans_many_cells() {
        let mut index = GridIndex::new(0.01);
        let region = circle("big", -74.0, 40.7, 10_000.0);
        index.add(&region);

        // ~0.09 deg of latitude in each direction at 10km: many buckets.
        assert!(index.bucket_count() > 100);

        // Visible from a point well away from the center but inside the bbox.
        let candidates = index.candidates(&Point::new(-74.05, 40.75));
        assert!(candidates.contains("big"));

        index.remove(&region);
        assert_eq!(index.bucket_count(), 0);
    }

    #[test]
    fn test_candidates_superset_of_containers() {
        let mut index = GridIndex::new(0.01);
        let mut regions = Vec::new();
        for i in 0..50 {
            let lon = -74.0 + (i % 10) as f64 * 0.005;
            let lat = 40.7 + (i / 10) as f64 * 0.005;
            let region = circle(&format!("r{i}"), lon, lat, 200.0);
            index.add(&region);
            regions.push(region);
        }

        let probe = Point::new(-73.99, 40.71);
        let candidates = index.candidates(&probe);
        for region in &regions {
            if region.contains(&probe) {
                assert!(
                    candidates.contains(&region.id),
                    "index missed containing region {}",
                    region.id
                );
            }
        }
    }

    #[test]
    fn test_polygon_indexing() {
        let mut index = GridIndex::new(0.01);
        let region = Region::polygon(
            "zone",
            vec![(-74.02, 40.70), (-73.98, 40.70), (-73.98, 40.74), (-74.02, 40.74)],
        )
        .unwrap();

        index.add(&region);
        assert!(index.candidates(&Point::new(-74.0, 40.72)).contains("zone"));

        index.remove(&region);
        assert!(index.is_empty());
    }
}
