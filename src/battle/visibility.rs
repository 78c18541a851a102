//! Line tracing for sight, fire and thrown arcs
//!
//! Terrain only: units are layered on top by the battlefield.

use crate::battle::spatial::{SpatialQuery, TileTrace};
use crate::core::types::Position;

/// Points of a 3d Bresenham line, `from` excluded, `to` included
pub fn line_points(from: Position, to: Position) -> Vec<Position> {
    let (dx, dy, dz) = (to.x - from.x, to.y - from.y, to.z - from.z);
    let (ax, ay, az) = (dx.abs(), dy.abs(), dz.abs());
    let (sx, sy, sz) = (dx.signum(), dy.signum(), dz.signum());
    let steps = ax.max(ay).max(az);
    let mut points = Vec::with_capacity(steps as usize);

    let (mut x, mut y, mut z) = (from.x, from.y, from.z);
    if ax >= ay && ax >= az {
        let (mut ey, mut ez) = (2 * ay - ax, 2 * az - ax);
        for _ in 0..steps {
            if ey >= 0 {
                y += sy;
                ey -= 2 * ax;
            }
            if ez >= 0 {
                z += sz;
                ez -= 2 * ax;
            }
            ey += 2 * ay;
            ez += 2 * az;
            x += sx;
            points.push(Position::new(x, y, z));
        }
    } else if ay >= ax && ay >= az {
        let (mut ex, mut ez) = (2 * ax - ay, 2 * az - ay);
        for _ in 0..steps {
            if ex >= 0 {
                x += sx;
                ex -= 2 * ay;
            }
            if ez >= 0 {
                z += sz;
                ez -= 2 * ay;
            }
            ex += 2 * ax;
            ez += 2 * az;
            y += sy;
            points.push(Position::new(x, y, z));
        }
    } else {
        let (mut ex, mut ey) = (2 * ax - az, 2 * ay - az);
        for _ in 0..steps {
            if ex >= 0 {
                x += sx;
                ex -= 2 * az;
            }
            if ey >= 0 {
                y += sy;
                ey -= 2 * az;
            }
            ex += 2 * ax;
            ey += 2 * ay;
            z += sz;
            points.push(Position::new(x, y, z));
        }
    }
    points
}

/// Trace a straight line through terrain
///
/// Walls stop the line; so does any floor crossed between levels.
pub fn trace_line<M: SpatialQuery + ?Sized>(map: &M, from: Position, to: Position) -> TileTrace {
    let mut trace = TileTrace::default();
    let mut prev = from;
    for point in line_points(from, to) {
        let Some(tile) = map.tile(point) else {
            trace.blocked_at = Some(point);
            break;
        };
        let floor_between = match point.z - prev.z {
            1 => tile.floor,
            -1 => map.tile(prev).map_or(false, |t| t.floor),
            _ => false,
        };
        if tile.blocks_fire() || floor_between {
            trace.blocked_at = Some(point);
            break;
        }
        trace.smoke += tile.smoke as i32;
        trace.visited.push(point);
        prev = point;
    }
    trace
}

/// Clear sight within `view_distance`, where smoke eats into the range
pub fn has_line_of_sight<M: SpatialQuery + ?Sized>(
    map: &M,
    from: Position,
    to: Position,
    view_distance: i32,
) -> bool {
    let distance = from.distance_2d(&to);
    if distance > view_distance {
        return false;
    }
    let trace = map.trace(from, to);
    trace.is_clear() && distance + trace.smoke <= view_distance
}

/// Whether a lobbed object from `from` can land on `to`
pub fn validate_arc<M: SpatialQuery + ?Sized>(
    map: &M,
    from: Position,
    to: Position,
    max_range: i32,
) -> bool {
    if from.distance_sq(&to, false) > max_range * max_range {
        return false;
    }
    match map.tile(to) {
        Some(tile) if !tile.blocks_movement() => map.trace(from, to).is_clear(),
        _ => false,
    }
}

/// Tiles on the viewer's level it can currently see
pub fn visible_tiles<M: SpatialQuery + ?Sized>(
    map: &M,
    from: Position,
    view_distance: i32,
) -> Vec<Position> {
    let mut tiles = vec![from];
    for y in (from.y - view_distance)..=(from.y + view_distance) {
        for x in (from.x - view_distance)..=(from.x + view_distance) {
            let pos = Position::new(x, y, from.z);
            if pos != from && map.in_bounds(pos) && has_line_of_sight(map, from, pos, view_distance) {
                tiles.push(pos);
            }
        }
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::grid_map::GridMap;

    #[test]
    fn test_line_points_reach_target() {
        let from = Position::new(0, 0, 0);
        let to = Position::new(5, 2, 1);
        let points = line_points(from, to);
        assert_eq!(points.len(), 5);
        assert_eq!(points.last(), Some(&to));
        assert!(line_points(from, from).is_empty());
    }

    #[test]
    fn test_wall_blocks_line() {
        let map = GridMap::from_layers(&[&[".....", "..#..", "....."]]);
        let blocked = map.trace(Position::new(0, 1, 0), Position::new(4, 1, 0));
        assert_eq!(blocked.blocked_at, Some(Position::new(2, 1, 0)));
        let clear = map.trace(Position::new(0, 0, 0), Position::new(4, 0, 0));
        assert!(clear.is_clear());
        assert_eq!(clear.visited.len(), 4);
    }

    #[test]
    fn test_smoke_limits_sight() {
        let map = GridMap::from_layers(&[&["..SSS.."]]);
        let from = Position::new(0, 0, 0);
        let to = Position::new(6, 0, 0);
        assert!(has_line_of_sight(&map, from, to, 20));
        assert!(!has_line_of_sight(&map, from, to, 10));
    }

    #[test]
    fn test_floor_blocks_between_levels() {
        let map = GridMap::open(6, 1, 2);
        let trace = map.trace(Position::new(0, 0, 0), Position::new(5, 0, 1));
        assert!(!trace.is_clear());
    }

    #[test]
    fn test_arc_range_and_landing() {
        let map = GridMap::from_layers(&[&["....W...", "........"]]);
        let from = Position::new(0, 0, 0);
        assert!(validate_arc(&map, from, Position::new(3, 0, 0), 10));
        assert!(!validate_arc(&map, from, Position::new(4, 0, 0), 10));
        assert!(!validate_arc(&map, from, Position::new(3, 0, 0), 2));
        // Range is exact, not rounded
        assert!(validate_arc(&map, from, Position::new(3, 1, 0), 4));
        assert!(!validate_arc(&map, from, Position::new(3, 1, 0), 3));
    }
}
