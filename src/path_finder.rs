//! A* search over a half grid unit lattice anchored at the origin.
//!
//! Each node has eight neighbours offset by 0.5 grid units in x and/or y.
//! A node is rejected when it comes closer than [`CLEARANCE`] to any wall,
//! and a step is rejected when it crosses a wall.

use crate::error::{NavigationError, NavigationResult};
use crate::map::{Map, Point};
use nalgebra as na;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

/// Lattice spacing in grid units.
pub const STEP: f64 = 0.5;
/// Minimum allowed distance between a path point and a wall.
pub const CLEARANCE: f64 = 0.25;
/// Search margin around the arena bounds.
const BOUNDS_MARGIN: f64 = 1.0;
/// Rounding slack on the inclusive goal radius.
const GOAL_EPSILON: f64 = 1e-9;

pub trait PathPlanner: Send + Sync {
    /// Plan from `origin` to `destination`. The returned path starts at the
    /// origin and ends at the destination.
    fn plan(&self, map: &Map, origin: Point, destination: Point) -> NavigationResult<Vec<Point>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AStarPlanner;

impl PathPlanner for AStarPlanner {
    fn plan(&self, map: &Map, origin: Point, destination: Point) -> NavigationResult<Vec<Point>> {
        find_path(map, origin, destination)
    }
}

/// Lattice coordinate, in steps from the origin.
type Cell = (i64, i64);

#[derive(Debug, Clone, Copy)]
struct FrontierEntry {
    cell: Cell,
    f_score: f64,
}

impl Eq for FrontierEntry {}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for min-heap behaviour
        other.f_score.total_cmp(&self.f_score)
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Lattice<'a> {
    map: &'a Map,
    origin: Point,
    min: Point,
    max: Point,
}

impl<'a> Lattice<'a> {
    fn new(map: &'a Map, origin: Point, destination: Point) -> Self {
        let (min, max) = map
            .bounds()
            .map(|(min, max)| {
                (
                    min.inf(&origin).inf(&destination),
                    max.sup(&origin).sup(&destination),
                )
            })
            .unwrap_or((origin.inf(&destination), origin.sup(&destination)));
        let margin = na::Vector2::repeat(BOUNDS_MARGIN);
        Self {
            map,
            origin,
            min: min - margin,
            max: max + margin,
        }
    }

    fn point(&self, (i, j): Cell) -> Point {
        Point::new(self.origin.x + STEP * i as f64, self.origin.y + STEP * j as f64)
    }

    fn in_bounds(&self, point: &Point) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    fn is_valid(&self, point: &Point) -> bool {
        self.in_bounds(point) && self.map.clearance(point) >= CLEARANCE
    }
}

fn neighbours((i, j): Cell) -> impl Iterator<Item = Cell> {
    (-1..=1)
        .flat_map(move |di| (-1..=1).map(move |dj| (di, dj)))
        .filter(|&(di, dj)| di != 0 || dj != 0)
        .map(move |(di, dj)| (i + di, j + dj))
}

/// Finds a wall-clear path from `origin` to `destination`.
pub fn find_path(map: &Map, origin: Point, destination: Point) -> NavigationResult<Vec<Point>> {
    let no_path = || NavigationError::NoPathFound {
        origin,
        destination,
    };
    let lattice = Lattice::new(map, origin, destination);
    if map.clearance(&destination) < CLEARANCE {
        debug!("destination is too close to a wall");
        return Err(no_path());
    }

    let goal_tolerance = CLEARANCE * std::f64::consts::SQRT_2 + GOAL_EPSILON;
    let start: Cell = (0, 0);
    let mut frontier = BinaryHeap::new();
    let mut closed: HashSet<Cell> = HashSet::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut g_score: HashMap<Cell, f64> = HashMap::new();

    g_score.insert(start, 0.0);
    frontier.push(FrontierEntry {
        cell: start,
        f_score: na::distance(&origin, &destination),
    });

    while let Some(FrontierEntry { cell, .. }) = frontier.pop() {
        // stale duplicate of an already expanded node
        if !closed.insert(cell) {
            continue;
        }
        let point = lattice.point(cell);
        if na::distance(&point, &destination) <= goal_tolerance {
            let path = reconstruct_path(&lattice, &came_from, cell, destination);
            debug!(
                waypoints = path.len(),
                expanded = closed.len(),
                "path found"
            );
            return Ok(path);
        }

        let current_g = g_score.get(&cell).copied().unwrap_or(f64::INFINITY);
        for neighbour in neighbours(cell) {
            if closed.contains(&neighbour) {
                continue;
            }
            let neighbour_point = lattice.point(neighbour);
            if !lattice.is_valid(&neighbour_point) || map.crosses_wall(&point, &neighbour_point) {
                continue;
            }
            let tentative_g = current_g + na::distance(&point, &neighbour_point);
            let known_g = g_score.get(&neighbour).copied().unwrap_or(f64::INFINITY);
            if tentative_g < known_g {
                came_from.insert(neighbour, cell);
                g_score.insert(neighbour, tentative_g);
                frontier.push(FrontierEntry {
                    cell: neighbour,
                    f_score: tentative_g + na::distance(&neighbour_point, &destination),
                });
            }
        }
    }

    debug!(expanded = closed.len(), "frontier exhausted");
    Err(no_path())
}

fn reconstruct_path(
    lattice: &Lattice,
    came_from: &HashMap<Cell, Cell>,
    goal: Cell,
    destination: Point,
) -> Vec<Point> {
    let mut path = vec![lattice.point(goal)];
    let mut current = goal;
    while let Some(previous) = came_from.get(&current) {
        path.push(lattice.point(*previous));
        current = *previous;
    }
    path.reverse();
    if path.last() != Some(&destination) {
        path.push(destination);
    }
    path
}
