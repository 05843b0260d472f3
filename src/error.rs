use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Library cache error: {0}")]
    Cache(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Landmark index {index} out of range for a set of {len} points")]
    LandmarkIndex { index: usize, len: usize },

    #[error("Triangle ({0}, {1}, {2}) is not valid for the point set")]
    InvalidTriangle(usize, usize, usize),

    #[error("Mesh has no triangles")]
    EmptyMesh,

    #[error("Landmark {index} at ({x}, {y}) is outside the supported coordinate range")]
    CoordinateOutOfRange { index: usize, x: f64, y: f64 },

    #[error("Point set has {got} points, mesh expects {expected}")]
    PointCountMismatch { expected: usize, got: usize },

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("Segmentation map is {got_width}x{got_height}, image is {width}x{height}")]
    SegmentationSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Face detector error: {0}")]
    FaceDetector(String),

    #[error("Image has zero area")]
    EmptyImage,
}

pub type Result<T> = std::result::Result<T, Error>;
