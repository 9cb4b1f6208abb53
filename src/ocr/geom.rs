use super::{Point, Rect};

/// Reduces a polygon to its axis-aligned bounding box.
pub fn bounding_rect(points: &[Point]) -> Option<Rect> {
    let first = points.first()?;
    let mut min_x = first.x;
    let mut min_y = first.y;
    let mut max_x = first.x;
    let mut max_y = first.y;
    for point in &points[1..] {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    Some(Rect {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

/// Converts a flat `[x0, y0, x1, y1, ...]` coordinate list into points.
/// A trailing unpaired coordinate is ignored.
pub fn polygon_from_flat(coords: &[f32]) -> Vec<Point> {
    coords
        .chunks_exact(2)
        .map(|pair| Point::new(pair[0], pair[1]))
        .collect()
}

pub(super) fn center(rect: &Rect) -> Point {
    Point::new(rect.x + rect.width * 0.5, rect.y + rect.height * 0.5)
}

pub(super) fn contains(rect: &Rect, point: &Point) -> bool {
    point.x >= rect.x
        && point.x <= rect.x + rect.width
        && point.y >= rect.y
        && point.y <= rect.y + rect.height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_rect_uses_extreme_vertices() {
        let points = polygon_from_flat(&[12.0, 60.0, 110.0, 62.0, 108.0, 80.0, 10.0, 78.0]);
        let rect = bounding_rect(&points).expect("rect");
        assert_eq!(rect.x, 10.0);
        assert_eq!(rect.y, 60.0);
        assert_eq!(rect.width, 100.0);
        assert_eq!(rect.height, 20.0);
    }

    #[test]
    fn bounding_rect_of_empty_polygon_is_none() {
        assert!(bounding_rect(&[]).is_none());
    }

    #[test]
    fn flat_polygon_ignores_dangling_coordinate() {
        let points = polygon_from_flat(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(points, vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)]);
    }

    #[test]
    fn contains_checks_center_of_inner_box() {
        let outer = Rect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 60.0,
        };
        let inner = Rect {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 10.0,
        };
        assert!(contains(&outer, &center(&inner)));
        assert!(!contains(&inner, &Point::new(90.0, 5.0)));
    }
}
