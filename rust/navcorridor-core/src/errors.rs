use thiserror::Error;

/// Malformed input to [`crate::PathTracer::set_path`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path has no nodes")]
    EmptyPath,
    #[error("path has no parts")]
    EmptyParts,
    #[error("part {part} starts at {found}, expected {expected}")]
    NonContiguous { part: usize, expected: isize, found: isize },
    #[error("part {part} covers {start}..={end} outside of the {len} path nodes")]
    PartOutOfRange { part: usize, start: isize, end: isize, len: usize },
    #[error("off-mesh link part {part} must span exactly two nodes")]
    LinkPartBounds { part: usize },
    #[error("first and last parts must be node sequences")]
    BoundaryPartIsLink,
    #[error("parts {part} and {next} have the same kind; parts must alternate")]
    NotAlternating { part: usize, next: usize },
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("reading settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}
