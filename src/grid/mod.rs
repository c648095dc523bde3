pub mod compositor;
pub mod data_uri;
pub mod export;
pub mod registry;
pub mod session;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Number of columns (and maximum rows) in the grid
pub const COLUMNS: u8 = 3;

/// Number of addressable positions
pub const SLOT_COUNT: usize = 9;

/// Everything that can go wrong between picking a file and saving the PNG
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Not an image file ({mime}), choose a JPG, PNG or other image")]
    InvalidFileType { mime: String },

    #[error("Failed to read {origin}: {reason}")]
    FileReadFailure { origin: String, reason: String },

    #[error("Could not allocate a {width}x{height} canvas")]
    RenderContextUnavailable { width: u32, height: u32 },

    #[error("Image at position {position} failed to load: {reason}")]
    ImageDecodeFailure { position: Position, reason: String },

    #[error("Upload at least one image first")]
    NoImagesProvided,

    #[error("Position {0} is outside 1-9")]
    InvalidPosition(u8),

    #[error("'{0}' is not a grid position (1-9)")]
    UnparsablePosition(String),

    #[error("A composition is already running")]
    CompositionInProgress,

    #[error("Grid changed while composing, compose again")]
    CompositionOutdated,

    #[error("Failed to encode PNG: {0}")]
    EncodeFailure(String),

    #[error("Composition task failed: {0}")]
    TaskFailed(String),

    #[error("Failed to save {}: {reason}", .path.display())]
    ExportFailure { path: PathBuf, reason: String },
}

/// A grid position, 1-9, laid out row-major over three columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(u8);

impl Position {
    pub const FIRST: Position = Position(1);

    pub fn new(n: u8) -> Result<Self, GridError> {
        if (1..=SLOT_COUNT as u8).contains(&n) {
            Ok(Self(n))
        } else {
            Err(GridError::InvalidPosition(n))
        }
    }

    /// Position for a zero-based slot index
    pub fn from_index(index: usize) -> Option<Self> {
        if index < SLOT_COUNT {
            Some(Self(index as u8 + 1))
        } else {
            None
        }
    }

    /// Position at a zero-based row/column pair
    pub fn at(row: u8, col: u8) -> Option<Self> {
        if row < COLUMNS && col < COLUMNS {
            Some(Self(row * COLUMNS + col + 1))
        } else {
            None
        }
    }

    /// All nine positions in order
    pub fn all() -> impl Iterator<Item = Position> {
        (1..=SLOT_COUNT as u8).map(Position)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn row(self) -> u8 {
        (self.0 - 1) / COLUMNS
    }

    pub fn col(self) -> u8 {
        (self.0 - 1) % COLUMNS
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Position {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| GridError::UnparsablePosition(s.to_string()))?;
        Position::new(n)
    }
}
