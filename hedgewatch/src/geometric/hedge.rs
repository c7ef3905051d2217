use geo::{Area, BooleanOps, Coord, MultiPolygon, Polygon};
use log::{debug, info};
use serde::Serialize;

use crate::error::GeometryError;
use crate::geometric::detection::{Detection, DetectionSet};

/// Parts of a difference smaller than this (in square pixels) are numerical slivers
pub const AREA_EPSILON: f64 = 1e-9;

/// Shoelace area of a closed ring; rings with fewer than 3 vertices have no area
pub fn ring_area(ring: &[Coord<f64>]) -> f64 {
    // drop the repeated closing vertex before counting
    let open = match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    };
    if open.len() < 3 {
        return 0.0;
    }

    let mut twice_area = 0.0;
    let mut previous = open[open.len() - 1];
    for current in open {
        twice_area += current.x * previous.y - current.y * previous.x;
        previous = *current;
    }
    0.5 * twice_area.abs()
}

/// Area enclosed by the polygon's outline
pub fn polygon_area(polygon: &Polygon<f64>) -> f64 {
    ring_area(&polygon.exterior().0)
}

/// Point set produced by polygon differencing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Region {
    Empty,
    Single(Polygon<f64>),
    Multi(MultiPolygon<f64>),
}

impl Region {
    /// Collapse a list of parts into the narrowest variant, dropping slivers
    pub fn from_parts(parts: Vec<Polygon<f64>>) -> Self {
        let mut parts: Vec<Polygon<f64>> = parts
            .into_iter()
            .filter(|part| part.unsigned_area() > AREA_EPSILON)
            .collect();

        match parts.len() {
            0 => Region::Empty,
            1 => Region::Single(parts.remove(0)),
            _ => Region::Multi(MultiPolygon::new(parts)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Region::Empty)
    }

    pub fn polygons(&self) -> Vec<&Polygon<f64>> {
        match self {
            Region::Empty => Vec::new(),
            Region::Single(polygon) => vec![polygon],
            Region::Multi(multi) => multi.0.iter().collect(),
        }
    }

    /// Area of the region, holes excluded
    pub fn area(&self) -> f64 {
        match self {
            Region::Empty => 0.0,
            Region::Single(polygon) => polygon.unsigned_area(),
            Region::Multi(multi) => multi.unsigned_area(),
        }
    }

    /// GeoJSON geometry in pixel coordinates; `None` for an empty region
    pub fn to_geojson(&self) -> Option<geojson::Geometry> {
        match self {
            Region::Empty => None,
            Region::Single(polygon) => Some(geojson::Geometry::new(geojson::Value::from(polygon))),
            Region::Multi(multi) => Some(geojson::Geometry::new(geojson::Value::from(multi))),
        }
    }
}

/// Region covered by `a` but not by `b`
///
/// A zero-area `a` yields [`Region::Empty`]; a zero-area `b` leaves `a`
/// unchanged.
pub fn difference(a: &Polygon<f64>, b: &Polygon<f64>) -> Region {
    if polygon_area(a) <= AREA_EPSILON {
        return Region::Empty;
    }
    if polygon_area(b) <= AREA_EPSILON {
        return Region::Single(a.clone());
    }

    Region::from_parts(a.difference(b).0)
}

/// Symmetric percentage difference between two areas
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PercentageChange {
    Defined(f64),
    /// Neither side has any area to measure from
    Undefined,
}

impl PercentageChange {
    pub fn value(&self) -> Option<f64> {
        match self {
            PercentageChange::Defined(value) => Some(*value),
            PercentageChange::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, PercentageChange::Defined(_))
    }
}

/// `|A - B| / ((A + B) / 2) * 100`, undefined when both areas are zero
pub fn percentage_change_of_areas(area_a: f64, area_b: f64) -> PercentageChange {
    let mean = (area_a + area_b) / 2.0;
    if mean <= 0.0 || !mean.is_finite() {
        return PercentageChange::Undefined;
    }
    PercentageChange::Defined((area_a - area_b).abs() / mean * 100.0)
}

pub fn percentage_change(a: &Polygon<f64>, b: &Polygon<f64>) -> PercentageChange {
    percentage_change_of_areas(polygon_area(a), polygon_area(b))
}

/// First detection of `class` in provider order.
///
/// Later detections of the same class are ignored, they are not merged.
pub fn select_tracked<'a>(detections: &'a DetectionSet, class: &'a str) -> Option<&'a Detection> {
    detections.of_class(class).next()
}

/// Sum of the outline areas of every `class` detection
pub fn tracked_area(detections: &DetectionSet, class: &str) -> f64 {
    detections
        .of_class(class)
        .map(|detection| polygon_area(&detection.polygon))
        .sum()
}

/// Detections of one capture, named by its version label
#[derive(Debug, Clone, Copy)]
pub struct LabeledDetections<'a> {
    pub label: &'a str,
    pub detections: &'a DetectionSet,
}

/// Outcome of comparing the tracked objects of two captures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub before: Detection,
    pub after: Detection,
    /// Part of the earlier outline no longer covered in the later capture
    pub difference: Region,
    pub difference_area: f64,
    pub percentage_change: PercentageChange,
}

/// Compare the first tracked detection of each capture
pub fn compare(
    before: LabeledDetections<'_>,
    after: LabeledDetections<'_>,
    class: &str,
) -> Result<Comparison, GeometryError> {
    let before_hedge = select_tracked(before.detections, class);
    let after_hedge = select_tracked(after.detections, class);

    let (before_hedge, after_hedge) = match (before_hedge, after_hedge) {
        (Some(b), Some(a)) => (b, a),
        (b, a) => {
            let missing = [(before.label, b.is_none()), (after.label, a.is_none())]
                .into_iter()
                .filter(|(_, absent)| *absent)
                .map(|(label, _)| label.to_string())
                .collect();
            return Err(GeometryError::InsufficientDetections {
                class: class.to_string(),
                missing,
            });
        }
    };

    let difference = difference(&before_hedge.polygon, &after_hedge.polygon);
    let difference_area = difference.area();
    let percentage_change = percentage_change(&before_hedge.polygon, &after_hedge.polygon);

    info!(
        "Difference in area between {} and {}: {:.2} square pixels",
        before.label, after.label, difference_area
    );
    match percentage_change.value() {
        Some(value) => info!("Percentage difference: {:.2}%", value),
        None => debug!("Percentage difference undefined, both outlines are degenerate"),
    }

    Ok(Comparison {
        before: before_hedge.clone(),
        after: after_hedge.clone(),
        difference,
        difference_area,
        percentage_change,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, BoundingRect};

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + w, y: y),
            (x: x + w, y: y + h),
            (x: x, y: y + h),
            (x: x, y: y),
        ]
    }

    fn hedge(polygon: Polygon<f64>) -> Detection {
        Detection {
            class_label: "hedge".to_string(),
            polygon,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_triangle_area() {
        let triangle = polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 0.0, y: 3.0)];
        assert_eq!(polygon_area(&triangle), 6.0);
    }

    #[test]
    fn test_degenerate_area_is_zero() {
        let coords = [Coord { x: 0.0, y: 0.0 }, Coord { x: 5.0, y: 5.0 }];
        assert_eq!(ring_area(&coords), 0.0);
        assert_eq!(ring_area(&[]), 0.0);

        let line = polygon![(x: 0.0, y: 0.0), (x: 5.0, y: 5.0)];
        assert_eq!(polygon_area(&line), 0.0);

        let collinear = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0), (x: 2.0, y: 2.0)];
        assert_eq!(polygon_area(&collinear), 0.0);
    }

    #[test]
    fn test_area_ignores_orientation() {
        let clockwise = polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 10.0), (x: 10.0, y: 10.0), (x: 10.0, y: 0.0)];
        assert_eq!(polygon_area(&clockwise), 100.0);
        assert_eq!(polygon_area(&rect(0.0, 0.0, 10.0, 10.0)), 100.0);
    }

    #[test]
    fn test_identical_polygons_have_no_change() {
        let p = rect(3.0, 4.0, 12.0, 7.0);
        assert_eq!(percentage_change(&p, &p), PercentageChange::Defined(0.0));
    }

    #[test]
    fn test_percentage_change_is_symmetric() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(5.0, 5.0, 30.0, 2.0);
        assert_eq!(percentage_change(&a, &b), percentage_change(&b, &a));
    }

    #[test]
    fn test_percentage_change_undefined_without_area() {
        let line = polygon![(x: 0.0, y: 0.0), (x: 5.0, y: 5.0)];
        assert_eq!(percentage_change(&line, &line), PercentageChange::Undefined);
        assert_eq!(percentage_change_of_areas(0.0, 0.0), PercentageChange::Undefined);
        assert_eq!(PercentageChange::Undefined.value(), None);
    }

    #[test]
    fn test_percentage_change_one_side_empty() {
        assert_eq!(percentage_change_of_areas(50.0, 0.0), PercentageChange::Defined(200.0));
    }

    #[test]
    fn test_difference_with_itself_is_empty() {
        let a = rect(1.0, 1.0, 20.0, 8.0);
        assert_eq!(difference(&a, &a), Region::Empty);

        let triangle = polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 0.0, y: 3.0)];
        assert!(difference(&triangle, &triangle).is_empty());
    }

    #[test]
    fn test_difference_against_empty_returns_original() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let empty = Polygon::new(geo::LineString::new(vec![]), vec![]);
        assert_eq!(difference(&a, &empty), Region::Single(a.clone()));
        assert_eq!(difference(&empty, &a), Region::Empty);
    }

    #[test]
    fn test_difference_split_into_parts() {
        // a vertical strip through the middle cuts the rectangle in two
        let a = rect(0.0, 0.0, 30.0, 10.0);
        let strip = rect(10.0, -5.0, 10.0, 20.0);

        let region = difference(&a, &strip);
        assert!(matches!(region, Region::Multi(_)));
        assert_eq!(region.polygons().len(), 2);
        assert!((region.area() - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_difference_with_hole() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        let inner = rect(4.0, 4.0, 2.0, 2.0);

        let region = difference(&outer, &inner);
        assert_eq!(region.polygons().len(), 1);
        assert!((region.area() - 96.0).abs() < 1e-6);
        assert!(region.to_geojson().is_some());
    }

    #[test]
    fn test_disjoint_hedges_forty_percent() {
        let before: DetectionSet = vec![hedge(rect(0.0, 0.0, 10.0, 10.0))].into_iter().collect();
        let after: DetectionSet = vec![hedge(rect(20.0, 0.0, 10.0, 15.0))].into_iter().collect();

        let comparison = compare(
            LabeledDetections { label: "2023-02-23", detections: &before },
            LabeledDetections { label: "2024-03-07", detections: &after },
            "hedge",
        )
        .unwrap();

        let pct = comparison.percentage_change.value().unwrap();
        assert!((pct - 40.0).abs() < 1e-9);
        // nothing of the earlier hedge is covered later
        assert!((comparison.difference_area - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_difference_is_area_lost_not_gained() {
        // hedge shrinks on the right and grows upwards
        let before: DetectionSet = vec![hedge(rect(0.0, 0.0, 20.0, 10.0))].into_iter().collect();
        let after: DetectionSet = vec![hedge(rect(0.0, -5.0, 15.0, 15.0))].into_iter().collect();

        let comparison = compare(
            LabeledDetections { label: "2023-02-23", detections: &before },
            LabeledDetections { label: "2024-03-07", detections: &after },
            "hedge",
        )
        .unwrap();

        // 5x10 strip removed, not the 15x5 strip added
        assert!((comparison.difference_area - 50.0).abs() < 1e-6);
        let bounds = comparison.difference.polygons()[0].bounding_rect().unwrap();
        assert!((bounds.min().x - 15.0).abs() < 1e-6);
        assert!(bounds.min().y >= -1e-6);
    }

    #[test]
    fn test_only_first_tracked_detection_is_used() {
        let before: DetectionSet = vec![
            Detection::new("tree", vec![(0.0, 0.0), (50.0, 0.0), (50.0, 50.0)], None),
            hedge(rect(0.0, 0.0, 10.0, 10.0)),
            hedge(rect(100.0, 100.0, 20.0, 20.0)),
        ]
        .into_iter()
        .collect();
        let after: DetectionSet = vec![hedge(rect(0.0, 0.0, 10.0, 10.0))].into_iter().collect();

        let comparison = compare(
            LabeledDetections { label: "before", detections: &before },
            LabeledDetections { label: "after", detections: &after },
            "hedge",
        )
        .unwrap();

        assert_eq!(comparison.before.polygon, rect(0.0, 0.0, 10.0, 10.0));
        assert_eq!(comparison.percentage_change, PercentageChange::Defined(0.0));
        assert!(comparison.difference.is_empty());
        // the per-image total still accounts for every hedge
        assert_eq!(tracked_area(&before, "hedge"), 500.0);
    }

    #[test]
    fn test_insufficient_detections() {
        let before: DetectionSet = vec![hedge(rect(0.0, 0.0, 10.0, 10.0))].into_iter().collect();
        let after = DetectionSet::default();

        let err = compare(
            LabeledDetections { label: "2023-02-23", detections: &before },
            LabeledDetections { label: "2024-03-07", detections: &after },
            "hedge",
        )
        .unwrap_err();

        assert_eq!(
            err,
            GeometryError::InsufficientDetections {
                class: "hedge".to_string(),
                missing: vec!["2024-03-07".to_string()],
            }
        );
    }
}
