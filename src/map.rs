use crate::error::MapError;
use crate::geometry::{point_segment_distance, ray_segment_distance, segments_intersect};
use anyhow::Result;
use nalgebra as na;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

/// Position in grid units.
pub type Point = na::Point2<f64>;

const INCHES_PER_METER: f64 = 1.0 / 0.0254;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    position: Point,
    /// Radians, not normalized.
    theta: f64,
}

impl Pose {
    pub fn from_na(position: Point, theta: f64) -> Self {
        Self { position, theta }
    }

    pub fn new((x, y): (f64, f64), theta: f64) -> Self {
        Self {
            position: Point::new(x, y),
            theta,
        }
    }

    pub fn position(&self) -> &Point {
        &self.position
    }

    pub fn x(&self) -> f64 {
        self.position.x
    }

    pub fn y(&self) -> f64 {
        self.position.y
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{:.2}, {:.2}] -> {:.1}",
            self.position.x,
            self.position.y,
            self.theta.to_degrees()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallKind {
    Normal,
    Opponent,
    Silo,
    Reactor,
}

impl WallKind {
    fn code(&self) -> &'static str {
        match self {
            WallKind::Normal => "N",
            WallKind::Opponent => "O",
            WallKind::Silo => "S",
            WallKind::Reactor => "R",
        }
    }
}

impl FromStr for WallKind {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "N" => Ok(WallKind::Normal),
            "O" => Ok(WallKind::Opponent),
            "S" => Ok(WallKind::Silo),
            "R" => Ok(WallKind::Reactor),
            other => Err(MapError::UnknownWallKind(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub start: Point,
    pub end: Point,
    pub kind: WallKind,
}

impl Wall {
    pub fn new(start: (f64, f64), end: (f64, f64), kind: WallKind) -> Self {
        Self {
            start: Point::new(start.0, start.1),
            end: Point::new(end.0, end.1),
            kind,
        }
    }

    pub fn distance_to(&self, point: &Point) -> f64 {
        point_segment_distance(point, &self.start, &self.end)
    }
}

/// Static description of the arena. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    grid_size: f64,
    start_pose: Pose,
    walls: Vec<Wall>,
}

impl Map {
    pub fn new(grid_size: f64, start_pose: Pose, walls: Vec<Wall>) -> Result<Self, MapError> {
        if !(grid_size.is_finite() && grid_size > 0.0) {
            return Err(MapError::InvalidGridSize(grid_size));
        }
        Ok(Self {
            grid_size,
            start_pose,
            walls,
        })
    }

    /// Inches per grid unit.
    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    pub fn start_pose(&self) -> Pose {
        self.start_pose
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn inches_to_grid_units(&self, inches: f64) -> f64 {
        inches / self.grid_size
    }

    pub fn meters_to_grid_units(&self, meters: f64) -> f64 {
        self.inches_to_grid_units(meters * INCHES_PER_METER)
    }

    /// Distance from `point` to the closest wall, infinite on a map without walls.
    pub fn clearance(&self, point: &Point) -> f64 {
        self.walls
            .iter()
            .map(|wall| wall.distance_to(point))
            .fold(f64::INFINITY, f64::min)
    }

    /// True when the straight move `from..to` crosses any wall.
    pub fn crosses_wall(&self, from: &Point, to: &Point) -> bool {
        self.walls
            .iter()
            .any(|wall| segments_intersect(from, to, &wall.start, &wall.end))
    }

    /// Distance to the first wall hit by a ray, infinite if nothing is within `max_range`.
    pub fn ray_distance(&self, origin: &Point, theta: f64, max_range: f64) -> f64 {
        self.walls
            .iter()
            .filter_map(|wall| ray_segment_distance(origin, theta, max_range, &wall.start, &wall.end))
            .fold(f64::INFINITY, f64::min)
    }

    /// Axis aligned bounding box of all walls as `(min, max)`.
    pub fn bounds(&self) -> Option<(Point, Point)> {
        let mut corners = self.walls.iter().flat_map(|wall| [wall.start, wall.end]);
        let first = corners.next()?;
        Some(corners.fold((first, first), |(min, max), corner| {
            (min.inf(&corner), max.sup(&corner))
        }))
    }

    /// Uniform point inside the wall bounds. May land outside the arena on
    /// irregular maps; the planner rejects those.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
        match self.bounds() {
            Some((min, max)) => Point::new(
                min.x + rng.gen::<f64>() * (max.x - min.x),
                min.y + rng.gen::<f64>() * (max.y - min.y),
            ),
            None => self.start_pose.position,
        }
    }

    pub fn to_map_string(&self) -> String {
        let mut map_string = format!(
            "{:.2}:{:.2},{:.2},{:.2}:",
            self.grid_size,
            self.start_pose.x(),
            self.start_pose.y(),
            self.start_pose.theta()
        );
        for wall in &self.walls {
            map_string.push_str(&format!(
                "{:.2},{:.2},{:.2},{:.2},{}:",
                wall.start.x,
                wall.start.y,
                wall.end.x,
                wall.end.y,
                wall.kind.code()
            ));
        }
        map_string
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let map: Map = serde_json::from_reader(file)?;
        // re-run validation, serde bypasses the constructor
        Ok(Map::new(map.grid_size, map.start_pose, map.walls)?)
    }

    pub fn load_text(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(text.parse()?)
    }

    pub fn default_arena() -> Self {
        include_str!("../config/default_map.txt")
            .parse()
            .expect("built in arena map is valid")
    }
}

impl FromStr for Map {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches(':');
        if s.is_empty() {
            return Err(MapError::Empty);
        }
        let mut records = s.split(':').map(str::trim);
        let grid_size = parse_number(
            "grid size",
            records.next().ok_or(MapError::Empty)?,
        )?;
        let start_pose = parse_pose(records.next().ok_or(MapError::MissingStartPose)?)?;
        let walls = records.map(parse_wall).collect::<Result<Vec<_>, _>>()?;
        Map::new(grid_size, start_pose, walls)
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, MapError> {
    value
        .trim()
        .parse()
        .map_err(|_| MapError::InvalidNumber {
            field,
            value: value.to_owned(),
        })
}

fn split_fields<'a>(
    record_name: &'static str,
    record: &'a str,
    expected: usize,
) -> Result<Vec<&'a str>, MapError> {
    let fields: Vec<_> = record.split(',').map(str::trim).collect();
    if fields.len() != expected {
        return Err(MapError::FieldCount {
            record: record_name,
            expected,
            found: fields.len(),
        });
    }
    Ok(fields)
}

fn parse_pose(record: &str) -> Result<Pose, MapError> {
    let fields = split_fields("start pose", record, 3)?;
    Ok(Pose::new(
        (
            parse_number("start x", fields[0])?,
            parse_number("start y", fields[1])?,
        ),
        parse_number("start theta", fields[2])?,
    ))
}

fn parse_wall(record: &str) -> Result<Wall, MapError> {
    let fields = split_fields("wall", record, 5)?;
    Ok(Wall::new(
        (
            parse_number("wall start x", fields[0])?,
            parse_number("wall start y", fields[1])?,
        ),
        (
            parse_number("wall end x", fields[2])?,
            parse_number("wall end y", fields[3])?,
        ),
        fields[4].parse()?,
    ))
}
