use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// An error in the structure of the data, e.g. a required attribute is missing.
    #[error(r#"Error in the map data at '{tag}': "{msg}""#)]
    StructureError{ tag: String, msg: String },

    /// A value could not be parsed, e.g. the file is not valid xml or a number is malformed.
    #[error(transparent)]
    ParseError(Box<dyn std::error::Error + Send + Sync>),

    /// A general IO error, e.g. opening a file failed
    #[error(transparent)]
    IO(#[from] std::io::Error),

    /// A file referenced by the map (or the map itself) does not exist.
    #[error("Referenced file '{}' does not exist", .0.display())]
    MissingResource(PathBuf),

    /// The root `map` element could not be built, nothing can be loaded.
    #[error("Invalid map: {0}")]
    InvalidMap(Box<Error>),

    /// Map uses features that are not (yet) supported
    #[error("Feature not supported: {0}")]
    UnsupportedFeature(String)
}

impl Error {
    pub(crate) fn structure(tag: &str, msg: impl Into<String>) -> Self {
        Error::StructureError{ tag: tag.to_string(), msg: msg.into() }
    }

    /// Whether this error ends the whole load.
    ///
    /// Non fatal errors only abort the file (or the tile data element)
    /// they occurred in, the remaining queued files are still parsed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::IO(_) | Error::MissingResource(_) | Error::InvalidMap(_))
    }
}

impl From<xml::reader::Error> for Error {
    fn from(e: xml::reader::Error) -> Self {
        Error::ParseError(Box::new(e))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::ParseError(Box::new(e))
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(e: std::convert::Infallible) -> Self {
        match e {}
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Error::ParseError(Box::new(e))
    }
}

impl From<std::num::ParseFloatError> for Error {
    fn from(e: std::num::ParseFloatError) -> Self {
        Error::ParseError(Box::new(e))
    }
}

impl From<std::str::ParseBoolError> for Error {
    fn from(e: std::str::ParseBoolError) -> Self {
        Error::ParseError(Box::new(e))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::MissingResource("missing.tsx".into()).is_fatal());
        assert!(Error::InvalidMap(Box::new(Error::structure("map", "no width"))).is_fatal());
        assert!(!Error::structure("property", "Property is missing a name!").is_fatal());
        assert!(!Error::UnsupportedFeature("zstd".into()).is_fatal());
    }
}
