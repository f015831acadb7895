use crate::map::Point;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum MapError {
    #[error("map string is empty")]
    Empty,
    #[error("map is missing the start pose record")]
    MissingStartPose,
    #[error("grid size must be a positive number, got {0}")]
    InvalidGridSize(f64),
    #[error("{record} record expects {expected} fields, got {found}")]
    FieldCount {
        record: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("failed to parse {field} from {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("unknown wall kind {0:?}")]
    UnknownWallKind(String),
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum NavigationError {
    #[error(
        "no path found from ({:.2}, {:.2}) to ({:.2}, {:.2})",
        .origin.x,
        .origin.y,
        .destination.x,
        .destination.y
    )]
    NoPathFound { origin: Point, destination: Point },
    #[error("malformed map")]
    MalformedMap(#[from] MapError),
    #[error("target not reached after {waited:?}")]
    UnreachableTarget { waited: Duration },
    #[error("navigation was cancelled")]
    Cancelled,
    #[error("robot driver failed")]
    Driver(#[source] anyhow::Error),
}

pub type NavigationResult<T> = std::result::Result<T, NavigationError>;
