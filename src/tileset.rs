use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{
    attributes::Attributes,
    math::{self, ivec2},
    object::Object,
    resource_manager::{ImageHandle, ResourceManager},
    Color, PropertyContainer, Result,
};

/// Index of a tileset inside [Map::tilesets](crate::Map::tilesets).
pub type TilesetId = usize;

/// An image referenced by a tileset, a single tile or an image layer.
#[derive(Debug, Clone)]
pub struct Image {
    /// Absolute location of the image.
    pub source: PathBuf,
    pub size: Option<ivec2>,
    /// Color that should be treated as transparent.
    pub trans: Option<Color>,
    /// Whatever the [ImageLoader](crate::ImageLoader) produced, None if the file is missing.
    pub handle: Option<ImageHandle>,
}

impl Image {
    pub(crate) fn from_attributes(attrs: &Attributes, base_dir: &Path, resources: &mut ResourceManager) -> Result<Self> {
        let source = crate::resolver::resolve_reference(base_dir, attrs.required_str("source")?);
        let size = match (attrs.get("width"), attrs.get("height")) {
            (Some(_), Some(_)) => Some(ivec2::new(attrs.required("width")?, attrs.required("height")?)),
            _ => None,
        };
        // Tiled writes the transparent color without the leading '#'
        let trans = match attrs.get("trans") {
            Some(hex) if hex.starts_with('#') => Some(hex.parse()?),
            Some(hex) => Some(format!("#{}", hex).parse()?),
            None => None,
        };
        let handle = resources.load_image(&source);
        Ok(Self { source, size, trans, handle })
    }
}

/// One frame of a tile animation.
#[derive(Debug, PartialEq, Clone)]
pub struct Frame {
    /// Local id of the tile shown during this frame.
    pub tile_id: u32,
    /// Duration in milliseconds.
    pub duration: u32,
    /// Area of the tileset image to show, if the tileset uses a sprite sheet.
    pub rect: Option<math::Rect>,
}

/// Extra information a tileset stores for some of its tiles.
#[derive(Debug, Default)]
pub struct TileData {
    pub id: u32,
    pub type_: String,
    pub probability: f32,
    /// Image of this tile, for image collection tilesets.
    pub image: Option<Image>,
    pub animation: Vec<Frame>,
    /// Collision shapes of the tile.
    pub collision: Vec<Object>,
    pub properties: PropertyContainer,
}

impl TileData {
    pub(crate) fn new(id: u32) -> Self {
        Self { id, probability: 1., ..Default::default() }
    }
}

#[derive(Debug)]
pub struct TileSet {
    pub id: TilesetId,
    pub name: String,
    /// The `.tsx` file this tileset was loaded from, None for inline tilesets.
    pub source: Option<PathBuf>,
    /// The GID of the first tile, as given by the most recent reference to this tileset.
    pub first_gid: u32,
    pub tile_size: ivec2,
    pub spacing: u32,
    pub margin: u32,
    pub tilecount: u32,
    pub columns: u32,
    /// Drawing offset of all tiles, from `tileoffset`.
    pub offset: ivec2,
    /// The sprite sheet, None for image collection tilesets.
    pub image: Option<Image>,
    pub tiles: BTreeMap<u32, TileData>,
    pub properties: PropertyContainer,
    /// False until the tileset data (inline or external) was read.
    pub initialized: bool,
}

impl TileSet {
    /// Placeholder for an external tileset that was referenced but not yet parsed.
    pub(crate) fn external(id: TilesetId, source: PathBuf, first_gid: u32) -> Self {
        Self {
            id,
            name: String::new(),
            source: Some(source),
            first_gid,
            tile_size: ivec2::default(),
            spacing: 0,
            margin: 0,
            tilecount: 0,
            columns: 0,
            offset: ivec2::default(),
            image: None,
            tiles: BTreeMap::new(),
            properties: PropertyContainer::new(),
            initialized: false,
        }
    }

    pub(crate) fn inline(id: TilesetId, first_gid: u32) -> Self {
        Self { source: None, ..Self::external(id, PathBuf::new(), first_gid) }
    }

    /// Read name and tile geometry from a `tileset` element.
    pub(crate) fn apply_geometry(&mut self, attrs: &Attributes) -> Result<()> {
        self.name = attrs.required("name")?;
        self.tile_size = ivec2::new(attrs.required("tilewidth")?, attrs.required("tileheight")?);
        self.spacing = attrs.or_default("spacing")?;
        self.margin = attrs.or_default("margin")?;
        self.tilecount = attrs.or_default("tilecount")?;
        self.columns = attrs.or_default("columns")?;
        self.initialized = true;
        Ok(())
    }

    pub(crate) fn tile_data_mut(&mut self, id: u32) -> &mut TileData {
        self.tiles.entry(id).or_insert_with(|| TileData::new(id))
    }

    /// Whether any image (sprite sheet or single tile image) was registered.
    pub fn has_images(&self) -> bool {
        self.image.is_some() || self.tiles.values().any(|t| t.image.is_some())
    }

    /// Whether `local_id` names a tile of this tileset.
    pub fn contains(&self, local_id: u32) -> bool {
        local_id < self.tilecount || self.tiles.get(&local_id).map_or(false, |t| t.image.is_some())
    }

    /// Area of the sprite sheet that shows the tile `local_id`.
    pub fn tile_rect(&self, local_id: u32) -> Option<math::Rect> {
        if self.image.is_none() || self.columns == 0 || !self.contains(local_id) {
            return None;
        }
        let stride = self.spacing as i32;
        let stride = self.tile_size + ivec2::new(stride, stride);

        let lid = local_id as i32;
        let cell = ivec2::new(lid % self.columns as i32, lid / self.columns as i32);
        let upper_left = ivec2::new(self.margin as i32, self.margin as i32) + cell * stride;
        Some(math::Rect::new(upper_left, self.tile_size))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    fn sheet(columns: u32, tilecount: u32) -> TileSet {
        let mut tileset = TileSet::inline(0, 1);
        tileset.tile_size = ivec2::new(16, 16);
        tileset.spacing = 2;
        tileset.margin = 1;
        tileset.columns = columns;
        tileset.tilecount = tilecount;
        tileset.image = Some(Image {
            source: "tiles.png".into(),
            size: None,
            trans: None,
            handle: Some(Arc::new(())),
        });
        tileset
    }

    #[test]
    fn test_tile_rect() {
        let tileset = sheet(4, 8);
        assert_eq!(tileset.tile_rect(0), Some(math::Rect::new(ivec2::new(1, 1), ivec2::new(16, 16))));
        assert_eq!(tileset.tile_rect(5), Some(math::Rect::new(ivec2::new(19, 19), ivec2::new(16, 16))));
        assert_eq!(tileset.tile_rect(8), None);
    }

    #[test]
    fn test_collection_contains() {
        let mut tileset = TileSet::inline(0, 1);
        assert!(!tileset.contains(3));
        tileset.tile_data_mut(3).image = Some(Image {
            source: "tree.png".into(), size: None, trans: None, handle: None,
        });
        assert!(tileset.contains(3));
        assert!(tileset.has_images());
        assert_eq!(tileset.tile_rect(3), None);
    }
}
