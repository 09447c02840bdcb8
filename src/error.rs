use thiserror::Error;

/// Failure while fetching or decoding one of the scene's assets.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch {location}: {reason}")]
    Fetch { location: String, reason: String },

    #[error("failed to read {location}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid HDR image: {0}")]
    Hdr(#[from] image::ImageError),

    #[error("invalid typeface document: {0}")]
    Typeface(#[from] serde_json::Error),

    #[error("glyph {glyph:?} has a malformed outline: {reason}")]
    InvalidOutline { glyph: char, reason: String },

    #[error("text {0:?} produced no geometry")]
    EmptyText(String),
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;
