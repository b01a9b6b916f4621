//! tessera loads [Tiled](https://mapeditor.org) maps (`.tmx`) together with
//! the external tilesets (`.tsx`) and object templates (`.tx`) they reference.
//!
//! Files are read with an event based XML reader and turned into a [Map].
//! External files are queued while the map is read and processed one after another,
//! each file is loaded only once.
//! Once every file was read, the tile data of all layers is resolved in parallel.
//!
//! Image data is never decoded by this crate, images are handed to an [ImageLoader]
//! and only the returned handle is stored.
//!
//! ```no_run
//! let path = std::path::Path::new("maps/dungeon.tmx");
//! let mymap = tessera::Map::from_file(&path)?;
//!
//! println!(
//!     "Map {} is {} by {} pixels.", path.display(),
//!     mymap.size.x * mymap.tile_size.x, mymap.size.y * mymap.tile_size.y
//! );
//!
//! # Ok::<(),tessera::Error>(())
//! ```
//!
//! To follow a load, implement [TilemapDelegate] and pass it to [Loader::load].

#[macro_use] extern crate impl_ops;

mod attributes;
mod builder;
mod delegate;
mod errors;
pub mod gid;
mod layer;
mod loader;
mod map;
pub mod math;
mod object;
pub mod payload;
mod property;
mod render;
pub mod resolver;
mod resource_manager;
pub mod template;
mod tileset;
pub mod worklist;

pub use delegate::{NoDelegate, TilemapDelegate};
pub use errors::{Error, Result};
pub use gid::{Flip, GID};
pub use layer::{
    Chunk, DrawOrder, GroupLayer, ImageLayer, Layer, LayerIndex, LayerKind, ObjectLayer, Tile, TileIterator, TileLayer,
};
pub use loader::{LoadOptions, Loader};
pub use map::{Map, TilesetRef};
pub use object::{Object, ObjectKind, Text};
pub use property::{ObjectReference, Property, PropertyContainer, PropertyValue};
pub use render::CompletionBarrier;
pub use resource_manager::{FileProvider, ImageHandle, ImageLoader, LazyLoader, Provider, ResourceManager};
pub use tileset::{Frame, Image, TileData, TileSet, TilesetId};
pub use worklist::{DocumentKind, DocumentReference, Worklist};

/// Version number consisting out of a MAJOR and MINOR version number, followed by an optional PATCH
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Version(
    /// Major version
    pub u32,
    /// Minor version
    pub u32,
    /// Patch version
    pub Option<u32>
);

impl std::str::FromStr for Version {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut items = s.trim().split('.');

        use Error::ParseError;
        let major = items.next().ok_or(ParseError("Major version is required but missing".into()))?.parse()?;
        let minor = items.next().ok_or(ParseError("Minor version is required but missing".into()))?.parse()?;
        let patch = items.next().map(str::parse).transpose()?;

        Ok(Version(major, minor, patch))
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Orientation {
    Orthogonal,
    Isometric,
    Staggered,
    Hexagonal,
}

impl std::str::FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        use Orientation::*;
        match s {
            "orthogonal" => Ok(Orthogonal),
            "isometric" => Ok(Isometric),
            "staggered" => Ok(Staggered),
            "hexagonal" => Ok(Hexagonal),
            _ => Err(Error::ParseError(format!("Invalid orientation '{}'", s).into()))
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum Renderorder {
    #[default]
    RightDown,
    RightUp,
    LeftDown,
    LeftUp,
}

impl std::str::FromStr for Renderorder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        use Renderorder::*;
        match s {
            "right-down" => Ok(RightDown),
            "right-up" => Ok(RightUp),
            "left-down" => Ok(LeftDown),
            "left-up" => Ok(LeftUp),
            _ => Err(Error::ParseError(format!("Invalid render order '{}'", s).into()))
        }
    }
}

/// Which axis is staggered, for staggered and hexagonal maps.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum StaggerAxis {
    X,
    Y,
}

impl std::str::FromStr for StaggerAxis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x" => Ok(StaggerAxis::X),
            "y" => Ok(StaggerAxis::Y),
            _ => Err(Error::ParseError(format!("Invalid stagger axis '{}'", s).into()))
        }
    }
}

/// Whether the odd or the even rows/columns are shifted, for staggered and hexagonal maps.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum StaggerIndex {
    Odd,
    Even,
}

impl std::str::FromStr for StaggerIndex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "odd" => Ok(StaggerIndex::Odd),
            "even" => Ok(StaggerIndex::Even),
            _ => Err(Error::ParseError(format!("Invalid stagger index '{}'", s).into()))
        }
    }
}

/// An 8 bit RGB color with alpha value.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct Color(u32);

impl Color {
    pub fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color(u32::from_be_bytes([a, r, g, b]))
    }

    pub fn alpha(&self) -> u8 { self.0.to_be_bytes()[0] }
    pub fn red(&self)   -> u8 { self.0.to_be_bytes()[1] }
    pub fn green(&self) -> u8 { self.0.to_be_bytes()[2] }
    pub fn blue(&self)  -> u8 { self.0.to_be_bytes()[3] }

    pub fn to_u32(&self) -> u32 { self.0 }
}

impl std::str::FromStr for Color {
    type Err = Error;

    /// Parse a color from a hex string, `#AARRGGBB` or `#RRGGBB`.
    ///
    /// ```
    /// let red: tessera::Color = "#FF0000".parse()?;
    /// assert_eq!(red.red(), 255);
    /// assert_eq!(red.blue(), 0);
    /// assert_eq!(red.alpha(), 255);
    /// # Ok::<(),tessera::Error>(())
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        let make_error = || Error::ParseError(format!("Invalid color string, expected #AARRGGBB, got '{}'", s).into());

        let hex = s.trim()
            .strip_prefix('#')
            .ok_or_else(make_error)?;

        match hex.len() {
            8 => {
                let [a, r, g, b] = u32::from_str_radix(hex, 16)?.to_be_bytes();
                Ok(Color::from_argb(a, r, g, b))
            },
            6 => {
                let [_, r, g, b] = u32::from_str_radix(hex, 16)?.to_be_bytes();
                Ok(Color::from_argb(255, r, g, b))
            },
            _ => Err(make_error())
        }
    }
}
