use std::path::{Path, PathBuf};

use crate::{
    attributes::Attributes,
    gid,
    layer::{Layer, LayerIndex, LayerKind, Tile},
    math::{self, ivec2},
    tileset::{TileSet, TilesetId},
    worklist::DocumentReference,
    Color, Error, Orientation, PropertyContainer, Renderorder, Result, StaggerAxis, StaggerIndex,
    Version, GID,
};

/// One `tileset` element of the map: which tileset, starting at which GID.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct TilesetRef {
    pub tileset: TilesetId,
    pub first_gid: u32,
}

/// The Map struct is the top level container for all relevant data inside of a Tiled map.
/// A Map consists of [TileSets](TileSet) and [Layers](Layer).
/// Stacking the layers in iteration order creates the final map image.
/// Each layer contains indices ([GIDs](GID)) referencing a specific tile in a tile sets.
#[derive(Debug)]
#[non_exhaustive]
pub struct Map {
    /// Absolute location of the map file.
    pub url: PathBuf,
    pub version: Version,
    pub editor_version: Option<Version>,
    pub orientation: Orientation,
    pub renderorder: Renderorder,
    pub size: ivec2,
    pub tile_size: ivec2,
    /// Tile data is stored in [chunks](crate::Chunk) instead of a fixed grid.
    pub infinite: bool,
    pub hexsidelength: Option<i32>,
    pub staggeraxis: Option<StaggerAxis>,
    pub staggerindex: Option<StaggerIndex>,
    pub next_layer_id: Option<u32>,
    pub next_object_id: Option<u32>,

    /// Background color of this map.
    /// By default fully transparent.
    pub backgroundcolor: Color,

    /// Every tileset used by the map, each external file is loaded only once.
    pub tilesets: Vec<TileSet>,

    /// The `tileset` elements of the map in document order.
    pub tileset_refs: Vec<TilesetRef>,

    /// All layers in document order, parents before their children.
    /// Use [Map::root_layers] or [Map::iter_layers] to walk the layer tree.
    pub layers: Vec<Layer>,

    /// Layers that are not part of a group.
    pub root_layers: Vec<LayerIndex>,

    /// Custom properties contained in this map.
    pub properties: PropertyContainer,

    /// All files that were read to load this map.
    pub documents: Vec<DocumentReference>,
}

impl Map {
    pub(crate) fn from_attributes(url: &Path, attrs: &Attributes) -> Result<Self> {
        let editor_version = attrs.get("tiledversion").map(|v| v.parse()).transpose()?;

        Ok(Map {
            url: url.to_path_buf(),
            version: attrs.or("version", Version(1, 0, None))?,
            editor_version,
            orientation: attrs.required("orientation")?,
            renderorder: attrs.or_default("renderorder")?,
            size: ivec2::new(attrs.required("width")?, attrs.required("height")?),
            tile_size: ivec2::new(attrs.required("tilewidth")?, attrs.required("tileheight")?),
            infinite: attrs.flag("infinite", false)?,
            hexsidelength: attrs.get("hexsidelength").map(|v| v.trim().parse()).transpose()?,
            staggeraxis: attrs.get("staggeraxis").map(|v| v.parse()).transpose()?,
            staggerindex: attrs.get("staggerindex").map(|v| v.parse()).transpose()?,
            next_layer_id: attrs.get("nextlayerid").map(|v| v.trim().parse()).transpose()?,
            next_object_id: attrs.get("nextobjectid").map(|v| v.trim().parse()).transpose()?,
            backgroundcolor: attrs.or_default("backgroundcolor")?,
            tilesets: Vec::new(),
            tileset_refs: Vec::new(),
            layers: Vec::new(),
            root_layers: Vec::new(),
            properties: PropertyContainer::new(),
            documents: Vec::new(),
        })
    }

    /// Load a map and everything it references from the file system.
    ///
    /// This is a shortcut for [Loader::load](crate::Loader::load) with default options
    /// and no delegate.
    pub fn from_file(path: &Path) -> Result<Self> {
        let filename = path.to_str()
            .ok_or_else(|| Error::ParseError(format!("Path {} is not valid unicode", path.display()).into()))?;
        crate::Loader::default().load(filename, None, &crate::NoDelegate)
    }

    pub fn tileset(&self, id: TilesetId) -> Option<&TileSet> {
        self.tilesets.get(id)
    }

    pub fn tileset_by_name(&self, name: &str) -> Option<&TileSet> {
        self.tilesets.iter().find(|t| t.name == name)
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Find the tileset and local id for a raw tile id (flip flags are allowed).
    pub fn resolve_tile(&self, raw: u32) -> Option<Tile> {
        TileResolver::new(&self.tilesets, &self.tileset_refs).resolve(raw).ok().flatten()
    }

    /// Fetch the image that belongs to a given GID.
    /// Returns the tileset and the pixel coordinates where the tile image is inside of the
    /// tileset image.
    ///
    /// Important: To correctly draw the tile,
    ///     inspect the [GID] passed to this function to lookup information if/how the tile should
    ///     be flipped.
    pub fn tile_image(&self, id: GID) -> Option<(&TileSet, math::Rect)> {
        let tile = self.resolve_tile(id.as_raw())?;
        let tileset = &self.tilesets[tile.tileset];
        Some((tileset, tileset.tile_rect(tile.local_id)?))
    }

    /// Iterate over all the layers in this map recursively.
    /// All layers are visited in depth-first pre-order manner.
    /// The iterator yields the group layers, as well as all of their sub-layers.
    ///
    /// In addition to the layer, a number of "pops" is also returned with each item.
    /// This is the number of group layers that was left with this iteration step.
    /// Some attributes of group layers affect all containing layers.
    /// If those attributes are accumulated in a stack,
    /// then the number of pops is the number of elemets to remove from the top of the stack.
    ///
    /// # Example
    ///
    /// Rendering layers under consideration of the group opacity:
    ///
    /// ```ignore
    /// let opacities = vec![1.];
    /// for (layer, pops) in map.iter_layers() {
    ///     opacities.truncate(opacities.len() - pops);
    ///     match &layer.kind {
    ///         LayerKind::Group(_) => { opacities.push(opacities.last().unwrap() * layer.opacity) },
    ///         LayerKind::Tile(tiles) => { render_layer(tiles, opacities.last()) }
    ///         _ => {}
    ///     }
    /// }
    /// ```
    pub fn iter_layers(&self) -> impl Iterator<Item=(&Layer, usize)> {
        LayerIterator::new(&self.layers, &self.root_layers)
    }
}

struct LayerIterator<'a> {
    layers: &'a [Layer],
    iter_stack: Vec<std::slice::Iter<'a, LayerIndex>>
}

impl<'a> LayerIterator<'a> {
    fn new(layers: &'a [Layer], roots: &'a [LayerIndex]) -> Self {
        Self { layers, iter_stack: vec![roots.iter()] }
    }
}

impl<'a> Iterator for LayerIterator<'a> {
    type Item = (&'a Layer, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let mut pops = 0;
        while let Some(iter) = self.iter_stack.last_mut() {
            if let Some(&index) = iter.next() {
                let layer = &self.layers[index];
                if let LayerKind::Group(group) = &layer.kind {
                    self.iter_stack.push(group.children.iter());
                }
                return Some((layer, pops));
            } else {
                pops += 1;
                self.iter_stack.pop();
            }
        }
        None
    }
}

/// Maps raw tile ids to tilesets, using the tileset references of a map.
#[derive(Clone, Copy)]
pub(crate) struct TileResolver<'a> {
    tilesets: &'a [TileSet],
    refs: &'a [TilesetRef],
}

impl<'a> TileResolver<'a> {
    pub fn new(tilesets: &'a [TileSet], refs: &'a [TilesetRef]) -> Self {
        Self { tilesets, refs }
    }

    /// Ok(None) for empty cells, Err with the unmasked id if no tileset contains the tile.
    pub fn resolve(&self, raw: u32) -> std::result::Result<Option<Tile>, u32> {
        let Some(gid) = GID::from_raw(raw) else { return Ok(None) };
        let id = gid::decode(raw).0;

        let owner = self.refs.iter()
            .filter(|r| r.first_gid <= id)
            .max_by_key(|r| r.first_gid)
            .ok_or(id)?;
        let local_id = id - owner.first_gid;
        match self.tilesets.get(owner.tileset) {
            Some(tileset) if tileset.contains(local_id) => Ok(Some(Tile{ gid, tileset: owner.tileset, local_id })),
            _ => Err(id),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::{GroupLayer, TileLayer};

    fn layer(index: LayerIndex, kind: LayerKind) -> Layer {
        Layer {
            index, id: None, name: String::new(), parent: None,
            offset: math::fvec2::default(), parallax: math::fvec2::new(1., 1.),
            opacity: 1., visible: true, tintcolor: Color::default(),
            properties: PropertyContainer::new(), kind,
        }
    }

    macro_rules! layer {
        ($i:expr, tile) => { layer($i, LayerKind::Tile(TileLayer::default())) };
        ($i:expr, group [$($c:expr),*]) => { layer($i, LayerKind::Group(GroupLayer{ children: vec![$($c),*] })) };
    }

    #[test]
    fn test_layer_iterator() {
        // 0 tile, 1 empty group, 2 tile, 3 group[4 group[5 tile, 6 tile]]
        let layers = vec![
            layer!(0, tile),
            layer!(1, group []),
            layer!(2, tile),
            layer!(3, group [4]),
            layer!(4, group [5, 6]),
            layer!(5, tile),
            layer!(6, tile),
        ];
        let roots = vec![0, 1, 2, 3];

        let result: Vec<_> = LayerIterator::new(&layers, &roots).collect();
        assert_eq!(result.len(), 7);

        // check that we get the group
        assert!(std::ptr::eq(result[2].0, &layers[2]));

        // no pops on a top level tile layer
        assert_eq!(result[0].1, 0);

        // one pop after the empty group
        assert_eq!(result[2].1, 1);

        let order: Vec<_> = result.iter().map(|(l, _)| l.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_tile_resolver() {
        let mut a = TileSet::inline(0, 1);
        a.tilecount = 4;
        let mut b = TileSet::inline(1, 5);
        b.tilecount = 10;
        let tilesets = vec![a, b];
        let refs = vec![
            TilesetRef{ tileset: 0, first_gid: 1 },
            TilesetRef{ tileset: 1, first_gid: 5 },
        ];
        let resolver = TileResolver::new(&tilesets, &refs);

        assert_eq!(resolver.resolve(0), Ok(None));
        assert_eq!(resolver.resolve(1).unwrap().map(|t| (t.tileset, t.local_id)), Some((0, 0)));
        assert_eq!(resolver.resolve(4).unwrap().map(|t| (t.tileset, t.local_id)), Some((0, 3)));
        let flipped = resolver.resolve(0x80000000 | 6).unwrap().unwrap();
        assert_eq!((flipped.tileset, flipped.local_id), (1, 1));
        assert!(flipped.gid.flip_horizontal());
        assert_eq!(resolver.resolve(15), Err(15));
    }
}
