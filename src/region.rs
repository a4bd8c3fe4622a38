//! Region model, validation, and containment tests.
//!
//! A region is the unit of monitoring: a circular or polygonal geographic
//! area with notification flags, activation rules, and an optional place in
//! the region hierarchy. Containment wraps the `geo` crate: haversine
//! distance for circles, even-odd ray casting for polygons.

use crate::error::{PerimeterError, Result};
use crate::rules::{ConditionalRule, TimeRule};
use geo::{BoundingRect, Contains, Distance, Haversine, LineString, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Meters per degree of latitude, used only for bounding-box expansion.
const METERS_PER_DEGREE: f64 = 111_000.0;

/// The geometric shape of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionShape {
    Circle { center: Point, radius_m: f64 },
    Polygon { ring: Polygon },
}

/// A monitored geographic area.
///
/// Regions are created through [`Region::circle`] or [`Region::polygon`],
/// which validate the geometry up front; containment never sees a
/// degenerate shape.
///
/// # Examples
///
/// ```rust
/// use perimeter::Region;
/// use geo::Point;
///
/// let office = Region::circle("office", Point::new(-74.0060, 40.7128), 200.0)?;
/// assert!(office.contains(&Point::new(-74.0060, 40.7128)));
/// # Ok::<(), perimeter::PerimeterError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub shape: RegionShape,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
    /// Ordered time-window rules; empty means always time-eligible.
    pub time_rules: Vec<TimeRule>,
    /// Conditional rules; all active rules must hold for eligibility.
    pub conditional_rules: Vec<ConditionalRule>,
    /// When linked under a parent, evaluate with the parent's notification
    /// flags and rules instead of this region's own.
    pub inherit_settings: bool,
}

impl Region {
    /// Create a circular region.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCoordinate` for an out-of-range center and
    /// `InvalidRadius` for a non-positive or non-finite radius.
    pub fn circle(id: impl Into<String>, center: Point, radius_m: f64) -> Result<Self> {
        validate_point(&center)?;
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(PerimeterError::InvalidRadius(radius_m));
        }

        Ok(Self {
            id: id.into(),
            shape: RegionShape::Circle { center, radius_m },
            notify_on_entry: true,
            notify_on_exit: true,
            time_rules: Vec::new(),
            conditional_rules: Vec::new(),
            inherit_settings: false,
        })
    }

    /// Create a polygonal region from an exterior ring of (lon, lat)
    /// vertices. The ring is closed implicitly.
    ///
    /// Self-intersecting rings are accepted and evaluated under even-odd
    /// semantics; only coordinate ranges and vertex count are validated.
    ///
    /// # Errors
    ///
    /// Returns `DegeneratePolygon` for fewer than three vertices and
    /// `InvalidCoordinate` for any out-of-range vertex.
    pub fn polygon(id: impl Into<String>, vertices: Vec<(f64, f64)>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(PerimeterError::DegeneratePolygon(vertices.len()));
        }
        for &(lon, lat) in &vertices {
            validate_point(&Point::new(lon, lat))?;
        }

        let ring = Polygon::new(LineString::from(vertices), vec![]);
        Ok(Self {
            id: id.into(),
            shape: RegionShape::Polygon { ring },
            notify_on_entry: true,
            notify_on_exit: true,
            time_rules: Vec::new(),
            conditional_rules: Vec::new(),
            inherit_settings: false,
        })
    }

    /// Set which transitions produce events.
    pub fn with_notifications(mut self, on_entry: bool, on_exit: bool) -> Self {
        self.notify_on_entry = on_entry;
        self.notify_on_exit = on_exit;
        self
    }

    /// Append a time-window activation rule.
    pub fn with_time_rule(mut self, rule: TimeRule) -> Self {
        self.time_rules.push(rule);
        self
    }

    /// Append a conditional activation rule.
    pub fn with_conditional_rule(mut self, rule: ConditionalRule) -> Self {
        self.conditional_rules.push(rule);
        self
    }

    /// Inherit notification flags and rules from the linked parent region.
    pub fn with_inherited_settings(mut self) -> Self {
        self.inherit_settings = true;
        self
    }

    /// Whether the point lies inside this region.
    ///
    /// Circles use haversine distance with the boundary counting as inside
    /// (`<=`); polygons use the even-odd rule with boundary points outside.
    pub fn contains(&self, point: &Point) -> bool {
        match &self.shape {
            RegionShape::Circle { center, radius_m } => {
                Haversine.distance(*point, *center) <= *radius_m
            }
            RegionShape::Polygon { ring } => ring.contains(point),
        }
    }

    /// Axis-aligned bounding box enclosing the shape.
    ///
    /// Used only for spatial indexing, never for containment decisions. The
    /// circle box is a degree-offset approximation that always encloses the
    /// true circle.
    pub fn bounding_box(&self) -> Rect {
        match &self.shape {
            RegionShape::Circle { center, radius_m } => circle_bbox(center, *radius_m),
            RegionShape::Polygon { ring } => ring
                .bounding_rect()
                .unwrap_or_else(|| Rect::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 0.0, y: 0.0 })),
        }
    }

    /// Circle radius in meters, if circular.
    pub fn radius_m(&self) -> Option<f64> {
        match &self.shape {
            RegionShape::Circle { radius_m, .. } => Some(*radius_m),
            RegionShape::Polygon { .. } => None,
        }
    }

    pub fn is_circle(&self) -> bool {
        matches!(self.shape, RegionShape::Circle { .. })
    }
}

/// Validate that a point is a finite, in-range WGS84 coordinate.
pub fn validate_point(point: &Point) -> Result<()> {
    let (lon, lat) = (point.x(), point.y());
    if !lon.is_finite() || !lat.is_finite() || !(-90.0..=90.0).contains(&lat)
        || !(-180.0..=180.0).contains(&lon)
    {
        return Err(PerimeterError::InvalidCoordinate { lat, lon });
    }
    Ok(())
}

/// Bounding box for a circle, expanded from the center by a degree offset.
///
/// Longitude offset widens with latitude; near the poles it is clamped to
/// the full range rather than dividing by a vanishing cosine.
fn circle_bbox(center: &Point, radius_m: f64) -> Rect {
    let lat_offset = radius_m / METERS_PER_DEGREE;

    let cos_lat = center.y().to_radians().cos().abs();
    let lon_offset = if cos_lat < 1e-6 {
        180.0
    } else {
        (radius_m / (METERS_PER_DEGREE * cos_lat)).min(180.0)
    };

    Rect::new(
        geo::coord! {
            x: (center.x() - lon_offset).max(-180.0),
            y: (center.y() - lat_offset).max(-90.0),
        },
        geo::coord! {
            x: (center.x() + lon_offset).min(180.0),
            y: (center.y() + lat_offset).min(90.0),
        },
    )
}
