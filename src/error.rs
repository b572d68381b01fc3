#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid length {len}, expected a multiple of {multiple}")]
    InvalidLength { len: usize, multiple: usize },
    #[error("invalid frame bounds: start={start} stop={stop}")]
    InvalidBounds { start: u64, stop: u64 },

    /// Failure writing emitted frame data to a caller-provided sink.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
