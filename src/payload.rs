//! Decoding of the tile data stored inside `data` and `chunk` elements.

use std::io::Read;

use crate::{Error, Result};

/// How the tile ids of a layer are written down.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum Encoding {
    /// One `<tile gid=".."/>` element per cell.
    #[default]
    Xml,
    Csv,
    Base64,
}

impl std::str::FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xml" => Ok(Encoding::Xml),
            "csv" => Ok(Encoding::Csv),
            "base64" => Ok(Encoding::Base64),
            other => Err(Error::UnsupportedFeature(format!("Unsupported data encoding '{}'", other))),
        }
    }
}

/// Compression applied to base64 encoded tile data.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum Compression {
    #[default]
    None,
    Zlib,
    Gzip,
    /// Recognized, but decoding it is not supported.
    Zstd,
}

impl std::str::FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(Compression::None),
            "zlib" => Ok(Compression::Zlib),
            "gzip" => Ok(Compression::Gzip),
            "zstd" => Ok(Compression::Zstd),
            other => Err(Error::UnsupportedFeature(format!("Unsupported data compression '{}'", other))),
        }
    }
}

/// Encoding and compression of one `data` element.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct DataFormat {
    pub encoding: Encoding,
    pub compression: Compression,
}

impl DataFormat {
    pub fn new(encoding: Encoding, compression: Compression) -> Self {
        Self { encoding, compression }
    }

    /// Decode the character data collected for a `data`/`chunk` element.
    ///
    /// Xml encoded tiles arrive as separate elements, for them the text
    /// content carries nothing and an empty list is returned.
    pub fn decode(&self, text: &str) -> Result<Vec<u32>> {
        match self.encoding {
            Encoding::Xml => Ok(Vec::new()),
            Encoding::Csv => decode_csv(text),
            Encoding::Base64 => decode_base64(text, self.compression),
        }
    }
}

/// Parse comma separated tile ids. Whitespace and line breaks are ignored.
pub fn decode_csv(text: &str) -> Result<Vec<u32>> {
    let stripped: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        return Ok(Vec::new());
    }

    // Tiled ends rows with a comma, only the very last one may be missing.
    let stripped = stripped.strip_suffix(',').unwrap_or(&stripped);
    stripped
        .split(',')
        .map(|token| token.parse::<u32>().map_err(|e| {
            Error::ParseError(format!("Invalid csv tile id '{}': {}", token, e).into())
        }))
        .collect()
}

/// Decode base64 data, inflate it if needed and read it as little endian u32 values.
pub fn decode_base64(text: &str, compression: Compression) -> Result<Vec<u32>> {
    // helper macro for decoding compressed data using libflate
    macro_rules! decode_with {
        ($input:ident $compression:ident) => {{
            let mut decoded = Vec::new();
            let mut decoder = libflate::$compression::Decoder::new(&$input[..])
                .map_err(|e| Error::ParseError(Box::new(e)))?;
            decoder.read_to_end(&mut decoded)
                .map_err(|e| Error::ParseError(Box::new(e)))?;
            decoded
        }};
    }

    let raw_bytes = base64::decode(text.trim())?;
    let raw_bytes = match compression {
        Compression::None => raw_bytes,
        Compression::Zlib => decode_with!(raw_bytes zlib),
        Compression::Gzip => decode_with!(raw_bytes gzip),
        Compression::Zstd => return Err(Error::UnsupportedFeature("zstd compressed tile data".into())),
    };

    const BYTE_SIZE: usize = std::mem::size_of::<u32>();
    if raw_bytes.len() % BYTE_SIZE != 0 {
        return Err(Error::ParseError(
            format!("Tile data has {} bytes, which is not a multiple of {}", raw_bytes.len(), BYTE_SIZE).into()
        ));
    }

    Ok(
        raw_bytes.chunks_exact(BYTE_SIZE)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    )
}
