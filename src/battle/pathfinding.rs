//! Dijkstra reachability and A* pathfinding over a `SpatialQuery`
//!
//! Respects step costs, unit footprint, occupied tiles and the move style.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashMap;

use crate::battle::actions::ActionCost;
use crate::battle::spatial::{MoveStyle, Path, ReachNode, ReachRequest, ReachableSet, SpatialQuery};
use crate::core::types::{Direction, Position};

/// Cheapest walking step; keeps the A* heuristic admissible
const MIN_WALK_STEP: i32 = 4;

/// Node in the open set
#[derive(Debug, Clone)]
struct PathNode {
    pos: Position,
    f_cost: i32, // g_cost + heuristic
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.pos == other.pos
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap, position as a stable tiebreak
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.pos.cmp(&self.pos))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Candidate neighbours for one step in the given style
fn neighbors(pos: Position, style: MoveStyle, vertical: bool) -> Vec<Position> {
    let mut out = Vec::with_capacity(26);
    match style {
        MoveStyle::Missile => {
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        if dx != 0 || dy != 0 || dz != 0 {
                            out.push(pos.offset(dx, dy, dz));
                        }
                    }
                }
            }
        }
        MoveStyle::Normal | MoveStyle::Run => {
            out.extend(Direction::ALL.iter().map(|&dir| pos.step(dir)));
            if vertical {
                out.push(pos.offset(0, 0, 1));
                out.push(pos.offset(0, 0, -1));
            }
        }
    }
    out
}

/// Cost of one step in the requested style, `None` if blocked
fn step<M: SpatialQuery + ?Sized>(
    map: &M,
    request: &ReachRequest,
    from: Position,
    to: Position,
) -> Option<ActionCost> {
    if !map.in_bounds(to) {
        return None;
    }
    match request.style {
        MoveStyle::Missile => {
            let tile = map.tile(to)?;
            (!tile.blocks_fire()).then_some(ActionCost::time(1))
        }
        MoveStyle::Normal | MoveStyle::Run => {
            let size = request.size.max(1);
            for dx in 0..size {
                for dy in 0..size {
                    if request.occupied.contains(&to.offset(dx, dy, 0)) {
                        return None;
                    }
                }
            }
            let time = map.step_cost(from, to, size, request.flying)?;
            Some(match request.style {
                MoveStyle::Run => ActionCost::new(time * 3 / 4, time * 3 / 4),
                _ => ActionCost::new(time, time / 2),
            })
        }
    }
}

fn allows_vertical<M: SpatialQuery + ?Sized>(map: &M, request: &ReachRequest, pos: Position) -> bool {
    request.flying || map.tile(pos).map_or(false, |t| t.lift)
}

/// Every tile reachable within the request budget
///
/// The origin is always included at zero cost. Discovery order is
/// deterministic for a given map and request.
pub fn reachable<M: SpatialQuery + ?Sized>(map: &M, request: &ReachRequest) -> ReachableSet {
    let mut set = ReachableSet::new();
    let mut open = BinaryHeap::new();

    set.upsert(ReachNode {
        position: request.origin,
        cost: ActionCost::FREE,
        prev: None,
    });
    open.push(PathNode {
        pos: request.origin,
        f_cost: 0,
    });

    while let Some(current) = open.pop() {
        let Some(node) = set.get(current.pos).copied() else {
            continue;
        };
        if current.f_cost > node.cost.time {
            continue;
        }

        let vertical = allows_vertical(map, request, current.pos);
        for next in neighbors(current.pos, request.style, vertical) {
            let Some(step_cost) = step(map, request, current.pos, next) else {
                continue;
            };
            let cost = node.cost + step_cost;
            if !cost.affordable(request.budget.time, request.budget.energy) {
                continue;
            }
            let improved = set.upsert(ReachNode {
                position: next,
                cost,
                prev: Some(current.pos),
            });
            if improved {
                open.push(PathNode {
                    pos: next,
                    f_cost: cost.time,
                });
            }
        }
    }

    set
}

fn heuristic(style: MoveStyle, from: Position, to: Position) -> i32 {
    let d = (from.x - to.x)
        .abs()
        .max((from.y - to.y).abs())
        .max((from.z - to.z).abs());
    match style {
        MoveStyle::Missile => d,
        MoveStyle::Run => d * MIN_WALK_STEP * 3 / 4,
        MoveStyle::Normal => d * MIN_WALK_STEP,
    }
}

/// Find the cheapest path using A*
///
/// The request budget is ignored; callers compare the returned cost
/// themselves. Returns `None` if no path exists.
pub fn find_path<M: SpatialQuery + ?Sized>(
    map: &M,
    request: &ReachRequest,
    goal: Position,
) -> Option<Path> {
    let start = request.origin;
    if start == goal {
        return Some(Path {
            steps: Vec::new(),
            cost: ActionCost::FREE,
        });
    }
    if !map.in_bounds(goal) {
        return None;
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: AHashMap<Position, Position> = AHashMap::new();
    let mut g_scores: AHashMap<Position, ActionCost> = AHashMap::new();

    g_scores.insert(start, ActionCost::FREE);
    open_set.push(PathNode {
        pos: start,
        f_cost: heuristic(request.style, start, goal),
    });

    while let Some(current) = open_set.pop() {
        if current.pos == goal {
            let cost = g_scores.get(&goal).copied().unwrap_or_default();
            return Some(Path {
                steps: reconstruct_path(&came_from, start, goal),
                cost,
            });
        }

        let Some(current_g) = g_scores.get(&current.pos).copied() else {
            continue;
        };

        let vertical = allows_vertical(map, request, current.pos);
        for neighbor in neighbors(current.pos, request.style, vertical) {
            let Some(step_cost) = step(map, request, current.pos, neighbor) else {
                continue;
            };

            let tentative = current_g + step_cost;
            let better = g_scores
                .get(&neighbor)
                .map_or(true, |known| tentative.time < known.time);

            if better {
                came_from.insert(neighbor, current.pos);
                g_scores.insert(neighbor, tentative);
                open_set.push(PathNode {
                    pos: neighbor,
                    f_cost: tentative.time + heuristic(request.style, neighbor, goal),
                });
            }
        }
    }

    None // No path found
}

/// Reconstruct steps from the came_from map, start excluded
fn reconstruct_path(
    came_from: &AHashMap<Position, Position>,
    start: Position,
    mut current: Position,
) -> Vec<Position> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::grid_map::GridMap;
    use ahash::AHashSet;

    fn request(origin: Position, time: i32, occupied: &AHashSet<Position>) -> ReachRequest<'_> {
        ReachRequest {
            origin,
            size: 1,
            flying: false,
            budget: ActionCost::new(time, 1000),
            style: MoveStyle::Normal,
            occupied,
        }
    }

    #[test]
    fn test_pathfind_straight_line() {
        let map = GridMap::open(10, 10, 1);
        let occupied = AHashSet::new();
        let start = Position::new(0, 0, 0);
        let goal = Position::new(5, 0, 0);

        let path = find_path(&map, &request(start, 0, &occupied), goal).expect("open map");

        assert_eq!(path.steps.len(), 5);
        assert_eq!(path.destination(), Some(goal));
        assert_eq!(path.cost.time, 20);
    }

    #[test]
    fn test_pathfind_around_wall() {
        let map = GridMap::from_layers(&[&[
            ".....", //
            ".###.", //
            ".....", //
        ]]);
        let occupied = AHashSet::new();
        let path = find_path(
            &map,
            &request(Position::new(0, 1, 0), 0, &occupied),
            Position::new(4, 1, 0),
        )
        .expect("path around the wall");
        assert!(path.steps.iter().all(|p| p.y != 1 || p.x == 4));
    }

    #[test]
    fn test_reachable_respects_budget() {
        let map = GridMap::open(10, 10, 1);
        let occupied = AHashSet::new();
        let set = reachable(&map, &request(Position::new(5, 5, 0), 8, &occupied));
        assert!(set.contains(Position::new(7, 5, 0)));
        assert!(!set.contains(Position::new(8, 5, 0)));
        assert!(set.contains(Position::new(5, 5, 0)));
        assert_eq!(set.cost_to(Position::new(6, 6, 0)).map(|c| c.time), Some(6));
    }

    #[test]
    fn test_occupied_tiles_block() {
        let map = GridMap::open(3, 1, 1);
        let mut occupied = AHashSet::new();
        occupied.insert(Position::new(1, 0, 0));
        let set = reachable(&map, &request(Position::new(0, 0, 0), 100, &occupied));
        assert!(!set.contains(Position::new(2, 0, 0)));
    }

    #[test]
    fn test_running_costs_less_time() {
        let map = GridMap::open(10, 1, 1);
        let occupied = AHashSet::new();
        let mut req = request(Position::new(0, 0, 0), 1000, &occupied);
        req.style = MoveStyle::Run;
        let path = find_path(&map, &req, Position::new(4, 0, 0)).expect("open");
        assert_eq!(path.cost.time, 12);
    }
}
