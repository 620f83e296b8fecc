use thiserror::Error;

/// Errors reported by the region engine.
///
/// The first group are ordinary geometric outcomes of editing; callers are
/// expected to match on them and recover (typically by showing a short
/// message and leaving the scene as it was). The second group signal misuse
/// of the API and indicate a bug in the calling code.
#[derive(Error, Debug)]
pub enum RegionError {
    // --- recoverable geometric outcomes ---
    #[error("regions share no pixels")]
    NoIntersection,

    #[error("operation produced an empty region")]
    Degenerate,

    #[error("invalid boundary: {0}")]
    InvalidBoundary(String),

    #[error("region id {0} is already in use")]
    DuplicateId(u32),

    #[error("malformed group: {0}")]
    MalformedGroup(String),

    // --- programmer misuse ---
    #[error("no region with id {0} in this store")]
    UnknownRegion(u32),

    #[error("mask is not binary: value {value} at ({x}, {y})")]
    NonBinaryMask { value: u8, x: u32, y: u32 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

pub type Result<T> = std::result::Result<T, RegionError>;
