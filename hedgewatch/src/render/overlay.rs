use geo::{coord, BooleanOps, BoundingRect, Coord, MultiPolygon, Polygon, Rect};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut, draw_text_mut};
use imageproc::point::Point;

use crate::commons::raster::{EncodedImage, RasterImage};
use crate::error::RenderError;
use crate::geometric::detection::DetectionSet;
use crate::geometric::hedge::{polygon_area, Region, AREA_EPSILON};
use crate::render::font::{label_font, LABEL_SCALE};

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const ORANGE: Rgb<u8> = Rgb([255, 165, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Shapes are clipped to the canvas grown by this many pixels on every side
const CLIP_MARGIN: f64 = 2.0;

/// Geometry drawn over a base image
#[derive(Debug, Clone)]
pub enum Overlay {
    SinglePolygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
    /// Raw detections, drawn with their class labels
    DetectionList(DetectionSet),
}

/// One polygon to draw, with an optional label at its first vertex
#[derive(Debug, Clone, Copy)]
pub struct OverlayShape<'a> {
    pub polygon: &'a Polygon<f64>,
    pub label: Option<&'a str>,
}

impl<'a> OverlayShape<'a> {
    pub fn exterior(&self) -> &'a [Coord<f64>] {
        &self.polygon.exterior().0
    }
}

impl Overlay {
    /// Every constituent polygon, whatever the variant
    pub fn shapes(&self) -> Vec<OverlayShape<'_>> {
        match self {
            Overlay::SinglePolygon(polygon) => vec![OverlayShape {
                polygon,
                label: None,
            }],
            Overlay::MultiPolygon(multi) => multi
                .0
                .iter()
                .map(|polygon| OverlayShape {
                    polygon,
                    label: None,
                })
                .collect(),
            Overlay::DetectionList(detections) => detections
                .iter()
                .map(|detection| OverlayShape {
                    polygon: &detection.polygon,
                    label: Some(detection.class_label.as_str()),
                })
                .collect(),
        }
    }
}

impl From<Region> for Overlay {
    fn from(region: Region) -> Self {
        match region {
            Region::Empty => Overlay::MultiPolygon(MultiPolygon::new(vec![])),
            Region::Single(polygon) => Overlay::SinglePolygon(polygon),
            Region::Multi(multi) => Overlay::MultiPolygon(multi),
        }
    }
}

impl From<DetectionSet> for Overlay {
    fn from(detections: DetectionSet) -> Self {
        Overlay::DetectionList(detections)
    }
}

/// Drawing options
///
/// `alpha` is the fill opacity; 0 draws outlines only. Edges are always opaque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStyle {
    pub fill_color: Rgb<u8>,
    pub edge_color: Rgb<u8>,
    pub alpha: f32,
    pub label_color: Rgb<u8>,
    pub draw_labels: bool,
}

impl RenderStyle {
    /// Outline only, labels on
    pub fn outline(color: Rgb<u8>) -> Self {
        RenderStyle {
            fill_color: color,
            edge_color: color,
            alpha: 0.0,
            label_color: WHITE,
            draw_labels: true,
        }
    }

    /// Translucent fill with a matching edge
    pub fn filled(color: Rgb<u8>, alpha: f32) -> Self {
        RenderStyle {
            fill_color: color,
            edge_color: color,
            alpha: alpha.clamp(0.0, 1.0),
            label_color: WHITE,
            draw_labels: true,
        }
    }
}

impl Default for RenderStyle {
    fn default() -> Self {
        RenderStyle::outline(RED)
    }
}

/// Composite `overlay` onto a copy of `base` and encode the result as PNG
pub fn render(base: &RasterImage, overlay: &Overlay, style: &RenderStyle) -> Result<EncodedImage, RenderError> {
    let canvas = compose(base, overlay, style)?;
    EncodedImage::encode_png(&canvas)
}

/// Composite without encoding
pub fn compose(base: &RasterImage, overlay: &Overlay, style: &RenderStyle) -> Result<RgbImage, RenderError> {
    let mut canvas = base.to_opaque_rgb();
    let shapes = overlay.shapes();
    let clipped: Vec<Polygon<f64>> = shapes
        .iter()
        .flat_map(|shape| clip_to_canvas(shape.polygon, canvas.width(), canvas.height()))
        .collect();

    let alpha = style.alpha.clamp(0.0, 1.0);
    if alpha > 0.0 {
        let mut mask = GrayImage::new(canvas.width(), canvas.height());
        for polygon in &clipped {
            fill_ring(&mut mask, &polygon.exterior().0, Luma([255]));
            for hole in polygon.interiors() {
                fill_ring(&mut mask, &hole.0, Luma([0]));
            }
        }
        blend(&mut canvas, &mask, style.fill_color, alpha);
    }

    for polygon in &clipped {
        stroke_ring(&mut canvas, &polygon.exterior().0, style.edge_color);
        for hole in polygon.interiors() {
            stroke_ring(&mut canvas, &hole.0, style.edge_color);
        }
    }

    if style.draw_labels && shapes.iter().any(|shape| shape.label.is_some()) {
        let font = label_font()?;
        let (width, height) = (canvas.width() as f64, canvas.height() as f64);
        for shape in &shapes {
            if let (Some(label), Some(anchor)) = (shape.label, shape.exterior().first()) {
                draw_text_mut(
                    &mut canvas,
                    style.label_color,
                    anchor.x.clamp(-width, width).round() as i32,
                    anchor.y.clamp(-height, height).round() as i32,
                    LABEL_SCALE,
                    &font,
                    label,
                );
            }
        }
    }

    Ok(canvas)
}

/// Part of `polygon` inside the canvas plus [`CLIP_MARGIN`]
///
/// Zero-area outlines are dropped. Clip edges fall in the margin, outside
/// the visible pixels.
fn clip_to_canvas(polygon: &Polygon<f64>, width: u32, height: u32) -> Vec<Polygon<f64>> {
    if polygon_area(polygon) <= AREA_EPSILON {
        return Vec::new();
    }
    let frame = Rect::new(
        coord! { x: -CLIP_MARGIN, y: -CLIP_MARGIN },
        coord! { x: width as f64 + CLIP_MARGIN, y: height as f64 + CLIP_MARGIN },
    );
    match polygon.bounding_rect() {
        None => Vec::new(),
        Some(bounds)
            if bounds.min().x >= frame.min().x
                && bounds.min().y >= frame.min().y
                && bounds.max().x <= frame.max().x
                && bounds.max().y <= frame.max().y =>
        {
            vec![polygon.clone()]
        }
        Some(_) => polygon.intersection(&frame.to_polygon()).0,
    }
}

/// Integer vertices with consecutive duplicates and the closing vertex removed
fn raster_ring(ring: &[Coord<f64>]) -> Vec<Point<i32>> {
    let mut points: Vec<Point<i32>> = Vec::with_capacity(ring.len());
    for coord in ring {
        let point = Point::new(coord.x.round() as i32, coord.y.round() as i32);
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

fn fill_ring(mask: &mut GrayImage, ring: &[Coord<f64>], value: Luma<u8>) {
    let points = raster_ring(ring);
    if points.len() < 3 {
        return;
    }
    draw_polygon_mut(mask, &points, value);
}

fn stroke_ring(canvas: &mut RgbImage, ring: &[Coord<f64>], color: Rgb<u8>) {
    if ring.len() < 2 {
        return;
    }
    for (start, end) in ring.iter().zip(ring.iter().cycle().skip(1)) {
        draw_line_segment_mut(
            canvas,
            (start.x as f32, start.y as f32),
            (end.x as f32, end.y as f32),
            color,
        );
    }
}

fn blend(canvas: &mut RgbImage, mask: &GrayImage, color: Rgb<u8>, alpha: f32) {
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if mask.get_pixel(x, y).0[0] == 0 {
            continue;
        }
        for channel in 0..3 {
            let base = pixel.0[channel] as f32;
            let overlay = color.0[channel] as f32;
            pixel.0[channel] = (base * (1.0 - alpha) + overlay * alpha).round() as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::detection::Detection;
    use crate::geometric::hedge::difference;
    use geo::polygon;
    use imageproc::drawing::text_size;

    const GREEN: Rgb<u8> = Rgb([20, 120, 20]);

    fn base() -> RasterImage {
        RasterImage::from_rgb(RgbImage::from_pixel(64, 64, GREEN))
    }

    fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]
    }

    fn decode(encoded: &EncodedImage) -> RgbImage {
        encoded.decode().unwrap().to_opaque_rgb()
    }

    #[test]
    fn test_outline_only_keeps_interior() {
        let overlay = Overlay::SinglePolygon(square(10.0, 10.0, 40.0));
        let style = RenderStyle {
            draw_labels: false,
            ..RenderStyle::outline(BLUE)
        };
        let image = decode(&render(&base(), &overlay, &style).unwrap());

        assert_eq!(image.get_pixel(30, 30), &GREEN);
        assert_eq!(image.get_pixel(10, 30), &BLUE);
        assert_eq!(image.get_pixel(30, 50), &BLUE);
        assert_eq!(image.get_pixel(5, 5), &GREEN);
    }

    #[test]
    fn test_opaque_fill() {
        let overlay = Overlay::SinglePolygon(square(10.0, 10.0, 40.0));
        let image = compose(&base(), &overlay, &RenderStyle::filled(ORANGE, 1.0)).unwrap();
        assert_eq!(image.get_pixel(30, 30), &ORANGE);
        assert_eq!(image.get_pixel(60, 60), &GREEN);
    }

    #[test]
    fn test_translucent_fill_blends() {
        let overlay = Overlay::SinglePolygon(square(10.0, 10.0, 40.0));
        let image = compose(&base(), &overlay, &RenderStyle::filled(Rgb([220, 0, 20]), 0.5)).unwrap();
        assert_eq!(image.get_pixel(30, 30), &Rgb([120, 60, 20]));
    }

    #[test]
    fn test_holes_are_not_filled() {
        let region = difference(&square(0.0, 0.0, 60.0), &square(20.0, 20.0, 20.0));
        let overlay = Overlay::from(region);
        let image = compose(&base(), &overlay, &RenderStyle::filled(ORANGE, 1.0)).unwrap();

        assert_eq!(image.get_pixel(10, 10), &ORANGE);
        assert_eq!(image.get_pixel(30, 30), &GREEN);
    }

    #[test]
    fn test_multi_part_shapes_iterate_uniformly() {
        let region = difference(&square(0.0, 0.0, 30.0), &polygon![
            (x: 10.0, y: -5.0),
            (x: 20.0, y: -5.0),
            (x: 20.0, y: 40.0),
            (x: 10.0, y: 40.0),
        ]);
        let overlay = Overlay::from(region);
        assert!(matches!(overlay, Overlay::MultiPolygon(_)));
        assert_eq!(overlay.shapes().len(), 2);
        assert!(overlay.shapes().iter().all(|shape| shape.label.is_none()));
    }

    #[test]
    fn test_detection_labels_drawn_at_first_vertex() {
        let detections: DetectionSet = vec![Detection::new(
            "hedge",
            vec![(12.0, 20.0), (60.0, 20.0), (60.0, 56.0), (12.0, 56.0)],
            Some(0.8),
        )]
        .into_iter()
        .collect();
        let overlay = Overlay::from(detections);
        let image = compose(&base(), &overlay, &RenderStyle::outline(ORANGE)).unwrap();

        let font = label_font().unwrap();
        let (width, _) = text_size(LABEL_SCALE, &font, "hedge");
        let line_height = LABEL_SCALE.y.ceil() as u32;
        let in_label = |x: u32, y: u32| x >= 12 && x <= 14 + width && y >= 20 && y <= 22 + line_height;
        assert!(image
            .enumerate_pixels()
            .any(|(x, y, p)| in_label(x, y) && p.0.iter().all(|c| *c > 200)));
        assert!(image
            .enumerate_pixels()
            .filter(|(x, y, _)| !in_label(*x, *y))
            .all(|(_, _, p)| *p != WHITE));
        // right edge and interior below the label are untouched by text
        assert_eq!(image.get_pixel(60, 48), &ORANGE);
        assert_eq!(image.get_pixel(30, 48), &GREEN);
    }

    #[test]
    fn test_labels_skipped_when_disabled() {
        let detections: DetectionSet = vec![Detection::new(
            "hedge",
            vec![(12.0, 20.0), (50.0, 20.0), (50.0, 40.0), (12.0, 40.0)],
            None,
        )]
        .into_iter()
        .collect();
        let style = RenderStyle {
            draw_labels: false,
            ..RenderStyle::outline(ORANGE)
        };
        let image = compose(&base(), &Overlay::from(detections), &style).unwrap();
        assert!(image.pixels().all(|p| *p == GREEN || *p == ORANGE));
    }

    #[test]
    fn test_far_off_vertices_are_clipped() {
        let small = RasterImage::from_rgb(RgbImage::from_pixel(16, 16, GREEN));
        let overlay = Overlay::SinglePolygon(polygon![
            (x: -1e12, y: 0.0),
            (x: 1e12, y: 0.0),
            (x: 0.0, y: 1e12),
        ]);

        let image = compose(&small, &overlay, &RenderStyle::filled(ORANGE, 0.4)).unwrap();

        // 0.6 * green + 0.4 * orange
        assert_eq!(image.get_pixel(8, 8), &Rgb([114, 138, 12]));
        assert_eq!(image.get_pixel(8, 0), &ORANGE);
    }

    #[test]
    fn test_shape_entirely_off_canvas_draws_nothing() {
        let overlay = Overlay::SinglePolygon(square(1e9, 1e9, 50.0));
        let image = compose(&base(), &overlay, &RenderStyle::filled(ORANGE, 1.0)).unwrap();
        assert!(image.pixels().all(|p| *p == GREEN));
    }

    #[test]
    fn test_empty_region_leaves_image_untouched() {
        let overlay = Overlay::from(Region::Empty);
        assert!(overlay.shapes().is_empty());
        let image = compose(&base(), &overlay, &RenderStyle::filled(ORANGE, 0.4)).unwrap();
        assert!(image.pixels().all(|p| *p == GREEN));
    }

    #[test]
    fn test_degenerate_polygon_does_not_panic() {
        let overlay = Overlay::SinglePolygon(polygon![(x: 5.0, y: 5.0), (x: 5.2, y: 5.1)]);
        let image = compose(&base(), &overlay, &RenderStyle::filled(ORANGE, 1.0)).unwrap();
        assert_eq!(image.get_pixel(40, 40), &GREEN);
    }
}
