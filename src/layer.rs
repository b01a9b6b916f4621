use crate::{
    attributes::Attributes,
    math::{fvec2, ivec2},
    object::Object,
    tileset::{Image, TilesetId},
    Color, Error, PropertyContainer, Renderorder, Result, GID,
};

/// Index of a layer inside [Map::layers](crate::Map::layers).
/// Layers are numbered in document order, parents before their children.
pub type LayerIndex = usize;

/// A placed tile, resolved against the tilesets of the map.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Tile {
    /// Global id including flip flags.
    pub gid: GID,
    pub tileset: TilesetId,
    /// Id of the tile inside its tileset.
    pub local_id: u32,
}

/// A layer of the map, see [LayerKind] for the different types.
#[derive(Debug)]
#[non_exhaustive]
pub struct Layer {
    pub index: LayerIndex,
    pub id: Option<u32>,
    pub name: String,
    /// The group containing this layer, None for top level layers.
    pub parent: Option<LayerIndex>,
    pub offset: fvec2,
    pub parallax: fvec2,
    pub opacity: f32,
    pub visible: bool,

    /// Color that is multiplied with the colors of the tiles in this layer.
    /// Defaults to opaque white, which acts as a no-op when multiplied.
    ///
    /// *Note:* Multiplication with the raw values of the [Color] struct would
    /// lead to the wrong result! The colors must first be converted to the
    /// invervall [0-1] (division by 255).
    pub tintcolor: Color,
    pub properties: PropertyContainer,
    pub kind: LayerKind,
}

/// This enum contains the different types of layers that can be found in a map
#[derive(Debug)]
#[non_exhaustive]
pub enum LayerKind {
    /// A layer containing a grid of tiles
    Tile(TileLayer),

    /// A layer grouping mutiple other layer together.
    /// Group Layers may be nested,
    /// forming a tree of layers.
    Group(GroupLayer),

    /// A layer containing objects.
    /// Objects are not aligned to the tile grid.
    /// They can be used for example to mark regions of interest.
    ///
    /// Object layers are also called object  groups.
    Object(ObjectLayer),

    /// A layer showing a single image.
    Image(ImageLayer),
}

impl Layer {
    /// Build a layer from one of the layer elements (`layer`, `objectgroup`, `imagelayer`, `group`).
    pub(crate) fn from_attributes(index: LayerIndex, parent: Option<LayerIndex>, attrs: &Attributes) -> Result<Self> {
        let kind = match attrs.tag() {
            "layer" => LayerKind::Tile(TileLayer::from_attributes(attrs)?),
            "objectgroup" => LayerKind::Object(ObjectLayer::from_attributes(attrs)?),
            "imagelayer" => LayerKind::Image(ImageLayer::from_attributes(attrs)?),
            "group" => LayerKind::Group(GroupLayer::default()),
            other => return Err(Error::structure(other, "Not a layer element")),
        };

        Ok(Self {
            index,
            id: attrs.get("id").map(|t| t.trim().parse()).transpose()?,
            name: attrs.or_default("name")?,
            parent,
            offset: attrs.fvec2_or_default("offsetx", "offsety")?,
            parallax: fvec2::new(attrs.or("parallaxx", 1.)?, attrs.or("parallaxy", 1.)?),
            opacity: attrs.or("opacity", 1.)?,
            visible: attrs.flag("visible", true)?,
            tintcolor: attrs.or("tintcolor", Color::from_argb(255, 255, 255, 255))?,
            properties: PropertyContainer::new(),
            kind,
        })
    }

    pub fn as_tile_layer(&self) -> Option<&TileLayer> {
        match &self.kind {
            LayerKind::Tile(layer) => Some(layer),
            _ => None,
        }
    }

    pub fn as_object_layer(&self) -> Option<&ObjectLayer> {
        match &self.kind {
            LayerKind::Object(layer) => Some(layer),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupLayer> {
        match &self.kind {
            LayerKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, LayerKind::Group(_))
    }
}

/// A block of tiles of an infinite map.
#[derive(Debug, PartialEq)]
pub struct Chunk {
    /// Position of the upper left tile, in tiles.
    pub pos: ivec2,
    pub size: ivec2,
    pub tiles: Vec<Option<Tile>>,
}

#[derive(Debug, Default)]
#[non_exhaustive]
pub struct TileLayer {
    pub size: ivec2,
    /// Tiles in row major order, None for empty cells.
    /// Stays empty for infinite maps, see [TileLayer::chunks].
    pub tiles: Vec<Option<Tile>>,
    pub chunks: Vec<Chunk>,
}

impl TileLayer {
    fn from_attributes(attrs: &Attributes) -> Result<Self> {
        Ok(Self {
            size: ivec2::new(attrs.required("width")?, attrs.required("height")?),
            tiles: Vec::new(),
            chunks: Vec::new(),
        })
    }

    /// Number of cells of the layer grid, zero for negative sizes.
    /// Saturates instead of overflowing for absurdly large layers.
    pub fn cell_count(&self) -> usize {
        let width = usize::try_from(self.size.x).unwrap_or(0);
        let height = usize::try_from(self.size.y).unwrap_or(0);
        width.saturating_mul(height)
    }

    /// Iterate over the tiles inside of this layer in the given render order.
    /// This iterator yields the tile and xy coordinates of each cell,
    /// with a None tile for empty cells.
    pub fn tiles_in_renderorder(&self, renderorder: Renderorder) -> TileIterator<'_> {
        TileIterator::new(self, renderorder)
    }
}

pub struct TileIterator<'layer> {
    layer: &'layer TileLayer,
    renderorder: Renderorder,
    step: usize,
}

impl<'layer> TileIterator<'layer> {
    pub(crate) fn new(layer: &'layer TileLayer, renderorder: Renderorder) -> Self {
        Self { layer, renderorder, step: 0 }
    }
}

impl<'a> Iterator for TileIterator<'a> {
    type Item = (ivec2, Option<&'a Tile>);

    fn next(&mut self) -> Option<Self::Item> {
        let size = self.layer.size;
        if self.step >= self.layer.cell_count() {
            return None;
        }
        // cell_count is zero unless both sides are positive
        let width = size.x as usize;
        let (column, row) = ((self.step % width) as i32, (self.step / width) as i32);
        self.step += 1;

        use Renderorder::*;
        let pos = match self.renderorder {
            RightDown => ivec2::new(column, row),
            RightUp => ivec2::new(column, size.y - 1 - row),
            LeftDown => ivec2::new(size.x - 1 - column, row),
            LeftUp => ivec2::new(size.x - 1 - column, size.y - 1 - row),
        };

        let tile = (pos.y as usize).checked_mul(width)
            .and_then(|row_start| row_start.checked_add(pos.x as usize))
            .and_then(|idx| self.layer.tiles.get(idx))
            .and_then(Option::as_ref);
        Some((pos, tile))
    }
}

/// A layer to group multiple sub-layers
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct GroupLayer {
    /// Direct children, in document order.
    pub children: Vec<LayerIndex>,
}

/// Order in which objects of a layer are drawn.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum DrawOrder {
    /// Sorted by y coordinate.
    #[default]
    TopDown,
    /// In the order they appear in the layer.
    Index,
}

impl std::str::FromStr for DrawOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "topdown" => Ok(DrawOrder::TopDown),
            "index" => Ok(DrawOrder::Index),
            _ => Err(Error::ParseError(format!("Invalid draw order '{}'", s).into()))
        }
    }
}

/// An ObjectLayer is a container of Objects.
/// Objects are not aligned to the tile grid,
/// and can be used to include extra information in a map.
///
/// Check the [Tiled Documentation](https://doc.mapeditor.org/en/stable/manual/objects/)
/// for more information on objects.
#[derive(Debug)]
#[non_exhaustive]
pub struct ObjectLayer {
    /// Color that is used to render [Objects](Object) in this layer.
    pub color: Color,
    pub draworder: DrawOrder,

    /// The [Objects](Object) contained in this layer
    pub objects: Vec<Object>,
}

impl ObjectLayer {
    fn from_attributes(attrs: &Attributes) -> Result<Self> {
        Ok(Self {
            color: attrs.or("color", Color::from_argb(255, 160, 160, 164))?,
            draworder: attrs.or_default("draworder")?,
            objects: Vec::new(),
        })
    }
}

#[derive(Debug, Default)]
#[non_exhaustive]
pub struct ImageLayer {
    pub image: Option<Image>,
    pub repeat_x: bool,
    pub repeat_y: bool,
}

impl ImageLayer {
    fn from_attributes(attrs: &Attributes) -> Result<Self> {
        Ok(Self {
            image: None,
            repeat_x: attrs.flag("repeatx", false)?,
            repeat_y: attrs.flag("repeaty", false)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use xml::{attribute::OwnedAttribute, name::OwnedName};

    fn attrs(pairs: &[(&str, &str)]) -> Vec<OwnedAttribute> {
        pairs.iter().map(|(n, v)| OwnedAttribute::new(OwnedName::local(*n), *v)).collect()
    }

    fn tile(raw: u32) -> Option<Tile> {
        GID::from_raw(raw).map(|gid| Tile{ gid, tileset: 0, local_id: raw - 1 })
    }

    #[test]
    fn test_tile_layer_requires_size() {
        let raw = attrs(&[("name", "ground"), ("width", "4")]);
        assert!(matches!(
            Layer::from_attributes(0, None, &Attributes::new("layer", &raw)),
            Err(Error::StructureError{ .. })
        ));
    }

    #[test]
    fn test_common_attributes() -> Result<()> {
        let raw = attrs(&[("id", "3"), ("name", "things"), ("visible", "0"), ("offsetx", "4.5"), ("draworder", "index")]);
        let layer = Layer::from_attributes(2, Some(1), &Attributes::new("objectgroup", &raw))?;
        assert_eq!(layer.id, Some(3));
        assert_eq!(layer.name, "things");
        assert!(!layer.visible);
        assert_eq!(layer.offset, fvec2::new(4.5, 0.));
        assert_eq!(layer.parent, Some(1));
        assert_eq!(layer.as_object_layer().map(|l| l.draworder), Some(DrawOrder::Index));
        Ok(())
    }

    #[test]
    fn test_tiles_in_renderorder() {
        let layer = TileLayer {
            size: ivec2::new(2, 2),
            tiles: vec![tile(1), tile(2), None, tile(4)],
            chunks: vec![],
        };

        let right_down: Vec<_> = layer.tiles_in_renderorder(Renderorder::RightDown)
            .map(|(pos, t)| (pos, t.map(|t| t.local_id)))
            .collect();
        assert_eq!(right_down, vec![
            (ivec2::new(0, 0), Some(0)),
            (ivec2::new(1, 0), Some(1)),
            (ivec2::new(0, 1), None),
            (ivec2::new(1, 1), Some(3)),
        ]);

        let left_up: Vec<_> = layer.tiles_in_renderorder(Renderorder::LeftUp).map(|(pos, _)| pos).collect();
        assert_eq!(left_up[0], ivec2::new(1, 1));
        assert_eq!(left_up[3], ivec2::new(0, 0));
    }

    #[test]
    fn test_cell_count_of_odd_sizes() {
        let mut layer = TileLayer { size: ivec2::new(65536, 65536), ..Default::default() };
        assert_eq!(layer.cell_count(), 65536usize.saturating_mul(65536));

        layer.size = ivec2::new(-3, 4);
        assert_eq!(layer.cell_count(), 0);
        assert_eq!(layer.tiles_in_renderorder(Renderorder::RightDown).count(), 0);

        layer.size = ivec2::new(i32::MAX, i32::MAX);
        assert!(layer.cell_count() > 0);
        let first = layer.tiles_in_renderorder(Renderorder::LeftUp).next();
        assert_eq!(first, Some((ivec2::new(i32::MAX - 1, i32::MAX - 1), None)));
    }
}
