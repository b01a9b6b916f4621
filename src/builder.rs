//! Builds the map document from the XML events of the map, tileset and template files.
//!
//! The builder is fed one file at a time. While reading it may discover further
//! files (external tilesets, templates) and add them to the [Worklist].

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, error};
use xml::attribute::OwnedAttribute;
use xml::reader::{EventReader, XmlEvent};

use crate::{
    attributes::Attributes,
    delegate::TilemapDelegate,
    layer::{Chunk, Layer, LayerIndex, LayerKind},
    map::{Map, TilesetRef},
    math::ivec2,
    object::{Object, ObjectKind},
    payload::{Compression, DataFormat, Encoding},
    property::{Property, PropertyContainer, PropertyValue},
    resolver::resolve_reference,
    resource_manager::ResourceManager,
    template::{apply_template, remap_gid, TemplateObject},
    tileset::{Frame, Image, TileSet, TilesetId},
    worklist::{DocumentKind, DocumentReference, Worklist},
    Error, Result, GID,
};

/// Elements whose content is not part of the document.
const SKIPPED_ELEMENTS: &[&str] = &["editorsettings", "wangsets", "terraintypes", "transformations"];

/// Identifies the tile data of a layer, or of one chunk of a layer in infinite maps.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub(crate) struct TileDataKey {
    pub layer: LayerIndex,
    pub chunk: Option<usize>,
}

/// Raw tile ids read from `data` and `chunk` elements, waiting to be assigned to their layers.
#[derive(Debug, Default)]
pub(crate) struct LayerTileBuffer {
    entries: HashMap<TileDataKey, Vec<u32>>,
}

impl LayerTileBuffer {
    pub fn entry(&mut self, key: TileDataKey) -> &mut Vec<u32> {
        self.entries.entry(key).or_default()
    }

    pub fn get(&self, key: TileDataKey) -> Option<&[u32]> {
        self.entries.get(&key).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tilesets loaded from external files, by file location.
/// Each file is turned into exactly one [TileSet].
#[derive(Debug, Default)]
pub(crate) struct TilesetRegistry {
    by_url: HashMap<PathBuf, TilesetId>,
}

impl TilesetRegistry {
    pub fn get(&self, url: &Path) -> Option<TilesetId> {
        self.by_url.get(url).copied()
    }

    pub fn insert(&mut self, url: PathBuf, id: TilesetId) {
        self.by_url.insert(url, id);
    }

    pub fn clear(&mut self) {
        self.by_url.clear();
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }
}

/// Location of an object inside the layers of the map.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) struct ObjectHandle {
    pub layer: LayerIndex,
    pub slot: usize,
}

/// Objects waiting for their template file, in the order they were read.
#[derive(Debug, Default)]
pub(crate) struct PendingTemplateObjects {
    by_template: HashMap<PathBuf, VecDeque<ObjectHandle>>,
}

impl PendingTemplateObjects {
    pub fn push(&mut self, template: PathBuf, object: ObjectHandle) {
        self.by_template.entry(template).or_default().push_back(object);
    }

    pub fn take(&mut self, template: &Path) -> VecDeque<ObjectHandle> {
        self.by_template.remove(template).unwrap_or_default()
    }
}

/// Nodes that can contain other elements.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum Container {
    Map,
    /// `defines` is false for a bare reference to an external tileset.
    Tileset{ id: TilesetId, defines: bool },
    Layer(LayerIndex),
    /// Collision shapes of a tile.
    Collision,
}

/// The tileset tile whose metadata is being read.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
struct TileScope {
    tileset: TilesetId,
    id: u32,
}

/// The object whose child elements are being read.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum ObjectScope {
    Layer(ObjectHandle),
    Collision{ tileset: TilesetId, tile: u32, slot: usize },
    Template,
}

#[derive(Debug)]
struct DataScope {
    layer: LayerIndex,
    /// None if encoding or compression are not understood, the data is skipped.
    format: Option<DataFormat>,
    chunk: Option<usize>,
    has_chunks: bool,
}

#[derive(Debug)]
struct OpenProperty {
    name: String,
    type_: String,
    class: String,
    value: Option<String>,
    members: PropertyContainer,
}

/// State of the file currently being read.
#[derive(Debug)]
struct ParseContext {
    mode: DocumentKind,
    url: PathBuf,
    base_dir: PathBuf,
    characters: String,
    stack: Vec<Container>,
    tile: Option<TileScope>,
    object: Option<ObjectScope>,
    data: Option<DataScope>,
    property_bags: Vec<PropertyContainer>,
    open_properties: Vec<OpenProperty>,
    template: Option<TemplateObject>,
    template_tileset: Option<(TilesetId, u32)>,
    skip_depth: usize,
}

impl ParseContext {
    fn new(reference: &DocumentReference) -> Self {
        Self {
            mode: reference.kind,
            url: reference.url.clone(),
            base_dir: reference.url.parent().map(Path::to_path_buf).unwrap_or_default(),
            characters: String::new(),
            stack: Vec::new(),
            tile: None,
            object: None,
            data: None,
            property_bags: Vec::new(),
            open_properties: Vec::new(),
            template: None,
            template_tileset: None,
            skip_depth: 0,
        }
    }

    fn top(&self) -> Option<Container> {
        self.stack.last().copied()
    }

    /// Remove the top of the stack if it matches.
    fn pop_if(&mut self, matches: impl Fn(Container) -> bool) -> Option<Container> {
        match self.top() {
            Some(top) if matches(top) => self.stack.pop(),
            _ => None,
        }
    }

    fn take_characters(&mut self) -> String {
        std::mem::take(&mut self.characters)
    }
}

/// Turns XML events into the map document.
pub(crate) struct DocumentBuilder<'a> {
    resources: &'a mut ResourceManager,
    delegate: &'a dyn TilemapDelegate,
    ignore_properties: bool,
    map: Option<Map>,
    registry: TilesetRegistry,
    tile_buffer: LayerTileBuffer,
    pending: PendingTemplateObjects,
    /// Tilesets first seen in a template, they get a GID range once all files are read.
    template_tilesets: Vec<TilesetId>,
    /// Objects whose tile id points into one of `template_tilesets`.
    template_tiles: Vec<(ObjectHandle, TilesetId)>,
    ctx: ParseContext,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(resources: &'a mut ResourceManager, delegate: &'a dyn TilemapDelegate, ignore_properties: bool) -> Self {
        Self {
            resources,
            delegate,
            ignore_properties,
            map: None,
            registry: TilesetRegistry::default(),
            tile_buffer: LayerTileBuffer::default(),
            pending: PendingTemplateObjects::default(),
            template_tilesets: Vec::new(),
            template_tiles: Vec::new(),
            ctx: ParseContext::new(&DocumentReference::new(PathBuf::new(), DocumentKind::Map)),
        }
    }

    #[cfg(test)]
    pub fn map(&self) -> Option<&Map> {
        self.map.as_ref()
    }

    /// Hand out the document and the parse time caches once all files were read.
    pub fn finish(self) -> Result<(Map, LayerTileBuffer, TilesetRegistry)> {
        let mut map = self.map.ok_or_else(|| {
            Error::InvalidMap(Box::new(Error::structure("map", "Document contains no map element")))
        })?;
        place_template_tilesets(&mut map, &self.template_tilesets, &self.template_tiles);
        Ok((map, self.tile_buffer, self.registry))
    }

    pub fn load_text(&mut self, url: &Path) -> Result<String> {
        self.resources.load_text(url)
    }

    /// Read one file. New references are appended to `worklist`.
    ///
    /// On error the rest of the file is skipped, everything built so far stays in the document.
    pub fn parse_document(&mut self, reference: &DocumentReference, text: &str, worklist: &mut Worklist) -> Result<()> {
        self.ctx = ParseContext::new(reference);
        debug!(url = %reference.url.display(), kind = ?reference.kind, "parsing document");

        for event in EventReader::new(text.as_bytes()) {
            match event? {
                XmlEvent::StartElement{ name, attributes, .. } => self.start_element(&name.local_name, &attributes, worklist)?,
                XmlEvent::EndElement{ name } => self.end_element(&name.local_name)?,
                XmlEvent::Characters(text) | XmlEvent::CData(text) => self.ctx.characters.push_str(&text),
                _ => {}
            }
        }
        Ok(())
    }

    fn map_mut(&mut self) -> Result<&mut Map> {
        self.map.as_mut().ok_or_else(|| Error::structure("map", "Element found before the map element"))
    }

    fn start_element(&mut self, tag: &str, raw: &[OwnedAttribute], worklist: &mut Worklist) -> Result<()> {
        if self.ctx.skip_depth > 0 || SKIPPED_ELEMENTS.contains(&tag) {
            self.ctx.skip_depth += 1;
            return Ok(());
        }
        self.ctx.characters.clear();

        let attrs = Attributes::new(tag, raw);
        match tag {
            "map" => self.start_map(&attrs),
            "tileset" => self.start_tileset(&attrs, worklist),
            "tileoffset" => self.start_tileoffset(&attrs),
            "image" => self.start_image(&attrs),
            "layer" | "objectgroup" | "imagelayer" | "group" => self.start_layer(&attrs),
            "data" => self.start_data(&attrs),
            "chunk" => self.start_chunk(&attrs),
            "tile" => self.start_tile(&attrs),
            "frame" => self.start_frame(&attrs),
            "object" => self.start_object(&attrs, worklist),
            "ellipse" | "point" | "polygon" | "polyline" | "text" => self.start_shape(&attrs),
            "properties" => {
                self.ctx.property_bags.push(PropertyContainer::new());
                Ok(())
            }
            "property" => self.start_property(&attrs),
            _ => Ok(()),
        }
    }

    fn end_element(&mut self, tag: &str) -> Result<()> {
        if self.ctx.skip_depth > 0 {
            self.ctx.skip_depth -= 1;
            return Ok(());
        }

        match tag {
            "map" => {
                self.ctx.pop_if(|c| c == Container::Map);
                Ok(())
            }
            "tileset" => self.end_tileset(),
            "layer" | "objectgroup" | "imagelayer" | "group" => self.end_layer(),
            "data" => self.end_data(),
            "chunk" => self.end_chunk(),
            "tile" => {
                // cells of xml encoded data have no scope
                if self.ctx.data.is_none() {
                    self.ctx.tile = None;
                }
                Ok(())
            }
            "object" => self.end_object(),
            "text" => self.end_text(),
            "properties" => self.end_properties(),
            "property" => self.end_property(),
            _ => Ok(()),
        }
    }

    fn start_map(&mut self, attrs: &Attributes) -> Result<()> {
        if self.ctx.mode != DocumentKind::Map || self.map.is_some() {
            return Err(Error::structure("map", "Unexpected map element"));
        }
        let map = Map::from_attributes(&self.ctx.url, attrs).map_err(|e| Error::InvalidMap(Box::new(e)))?;
        self.delegate.on_document_parsing_began(&map);
        self.map = Some(map);
        self.ctx.stack.push(Container::Map);
        Ok(())
    }

    /// Reuse the tileset loaded from `url`, or create a placeholder and queue the file.
    fn external_tileset(&mut self, url: PathBuf, first_gid: u32, worklist: &mut Worklist) -> Result<TilesetId> {
        let update_first_gid = self.ctx.mode == DocumentKind::Map;
        if let Some(id) = self.registry.get(&url) {
            if update_first_gid {
                self.map_mut()?.tilesets[id].first_gid = first_gid;
            }
            return Ok(id);
        }

        let map = self.map_mut()?;
        let id = map.tilesets.len();
        map.tilesets.push(TileSet::external(id, url.clone(), first_gid));
        if !update_first_gid {
            self.template_tilesets.push(id);
        }
        self.registry.insert(url.clone(), id);
        worklist.push(DocumentReference::new(url, DocumentKind::Tileset));
        Ok(id)
    }

    fn start_tileset(&mut self, attrs: &Attributes, worklist: &mut Worklist) -> Result<()> {
        let id = match self.ctx.mode {
            DocumentKind::Map => {
                let first_gid: u32 = attrs.required("firstgid")?;
                let id = match attrs.get("source") {
                    Some(source) => {
                        let url = resolve_reference(&self.ctx.base_dir, source);
                        self.external_tileset(url, first_gid, worklist)?
                    }
                    None => {
                        let map = self.map_mut()?;
                        let id = map.tilesets.len();
                        map.tilesets.push(TileSet::inline(id, first_gid));
                        id
                    }
                };
                self.map_mut()?.tileset_refs.push(TilesetRef{ tileset: id, first_gid });
                id
            }
            DocumentKind::Tileset => self.registry.get(&self.ctx.url)
                .ok_or_else(|| Error::structure("tileset", "Tileset file was not referenced by the map"))?,
            DocumentKind::Template => {
                let first_gid: u32 = attrs.required("firstgid")?;
                let url = resolve_reference(&self.ctx.base_dir, attrs.required_str("source")?);
                let id = self.external_tileset(url, first_gid, worklist)?;
                self.ctx.template_tileset = Some((id, first_gid));
                id
            }
        };

        let defines = attrs.has("name");
        if defines {
            self.map_mut()?.tilesets[id].apply_geometry(attrs)?;
        }
        self.ctx.stack.push(Container::Tileset{ id, defines });
        self.ctx.tile = None;
        Ok(())
    }

    fn end_tileset(&mut self) -> Result<()> {
        let Some(Container::Tileset{ id, defines }) = self.ctx.pop_if(|c| matches!(c, Container::Tileset{ .. })) else {
            return Ok(());
        };
        self.ctx.tile = None;

        let delegate = self.delegate;
        let tileset = &mut self.map_mut()?.tilesets[id];
        // frames read before the sprite sheet get their area now
        let rects: Vec<_> = tileset.tiles.values()
            .flat_map(|t| t.animation.iter().map(|f| f.tile_id))
            .map(|tile_id| tileset.tile_rect(tile_id))
            .collect();
        let frames = tileset.tiles.values_mut().flat_map(|t| t.animation.iter_mut());
        for (frame, rect) in frames.zip(rects) {
            if frame.rect.is_none() {
                frame.rect = rect;
            }
        }

        if defines && tileset.has_images() {
            delegate.on_tileset_added(tileset);
        }
        Ok(())
    }

    fn current_tileset(&self) -> Option<TilesetId> {
        self.ctx.stack.iter().rev().find_map(|c| match c {
            Container::Tileset{ id, .. } => Some(*id),
            _ => None,
        })
    }

    fn start_tileoffset(&mut self, attrs: &Attributes) -> Result<()> {
        let offset = ivec2::new(attrs.required("x")?, attrs.required("y")?);
        if let Some(id) = self.current_tileset() {
            self.map_mut()?.tilesets[id].offset = offset;
        }
        Ok(())
    }

    fn start_image(&mut self, attrs: &Attributes) -> Result<()> {
        let image = Image::from_attributes(attrs, &self.ctx.base_dir, self.resources)?;
        let tile = self.ctx.tile;
        let top = self.ctx.top();
        let map = self.map_mut()?;

        match (tile, top) {
            (Some(scope), _) => map.tilesets[scope.tileset].tile_data_mut(scope.id).image = Some(image),
            (None, Some(Container::Tileset{ id, .. })) => map.tilesets[id].image = Some(image),
            (None, Some(Container::Layer(index))) => {
                if let LayerKind::Image(layer) = &mut map.layers[index].kind {
                    layer.image = Some(image);
                }
            }
            _ => debug!(source = %image.source.display(), "image without owner ignored"),
        }
        Ok(())
    }

    fn start_layer(&mut self, attrs: &Attributes) -> Result<()> {
        if attrs.tag() == "objectgroup" && self.ctx.tile.is_some() {
            self.ctx.stack.push(Container::Collision);
            return Ok(());
        }
        if self.ctx.mode != DocumentKind::Map {
            return Err(Error::structure(attrs.tag(), "Layers are only allowed in maps"));
        }

        let stack = &self.ctx.stack;
        let map = self.map.as_mut().ok_or_else(|| Error::structure("map", "Element found before the map element"))?;
        let parent = stack.iter().rev().find_map(|c| match c {
            Container::Layer(i) if map.layers[*i].is_group() => Some(Some(*i)),
            Container::Map => Some(None),
            _ => None,
        }).flatten();

        let index = map.layers.len();
        let layer = Layer::from_attributes(index, parent, attrs)?;
        match parent {
            Some(p) => {
                if let LayerKind::Group(group) = &mut map.layers[p].kind {
                    group.children.push(index);
                }
            }
            None => map.root_layers.push(index),
        }
        map.layers.push(layer);
        self.ctx.stack.push(Container::Layer(index));
        Ok(())
    }

    fn end_layer(&mut self) -> Result<()> {
        match self.ctx.pop_if(|c| matches!(c, Container::Layer(_) | Container::Collision)) {
            Some(Container::Layer(index)) => {
                let delegate = self.delegate;
                delegate.on_layer_added(&self.map_mut()?.layers[index]);
            }
            _ => {}
        }
        Ok(())
    }

    fn start_data(&mut self, attrs: &Attributes) -> Result<()> {
        let is_tile_layer = |index: LayerIndex| self.map.as_ref()
            .map_or(false, |map| map.layers[index].as_tile_layer().is_some());
        let layer = match self.ctx.top() {
            Some(Container::Layer(index)) if is_tile_layer(index) => index,
            _ => return Err(Error::structure("data", "Tile data outside of a tile layer")),
        };

        let format = match (attrs.or_default::<Encoding>("encoding"), attrs.or_default::<Compression>("compression")) {
            (Ok(encoding), Ok(compression)) => Some(DataFormat::new(encoding, compression)),
            (Err(e), _) | (_, Err(e)) => {
                error!(url = %self.ctx.url.display(), layer, error = %e, "tile data skipped");
                None
            }
        };
        self.ctx.data = Some(DataScope{ layer, format, chunk: None, has_chunks: false });
        Ok(())
    }

    fn start_chunk(&mut self, attrs: &Attributes) -> Result<()> {
        let pos = ivec2::new(attrs.required("x")?, attrs.required("y")?);
        let size = ivec2::new(attrs.required("width")?, attrs.required("height")?);
        let layer = self.ctx.data.as_ref()
            .map(|d| d.layer)
            .ok_or_else(|| Error::structure("chunk", "Chunk outside of a data element"))?;

        let chunk = match &mut self.map_mut()?.layers[layer].kind {
            LayerKind::Tile(tiles) => {
                tiles.chunks.push(Chunk{ pos, size, tiles: Vec::new() });
                tiles.chunks.len() - 1
            }
            _ => return Err(Error::structure("chunk", "Chunk outside of a tile layer")),
        };
        if let Some(data) = &mut self.ctx.data {
            data.chunk = Some(chunk);
            data.has_chunks = true;
        }
        Ok(())
    }

    /// Decode the collected characters and store them under `key`.
    fn decode_payload(&mut self, key: TileDataKey, format: Option<DataFormat>) {
        let text = self.ctx.take_characters();
        let Some(format) = format else { return };
        if format.encoding == Encoding::Xml {
            // cells arrived as tile elements
            self.tile_buffer.entry(key);
            return;
        }
        match format.decode(&text) {
            Ok(ids) => self.tile_buffer.entry(key).extend(ids),
            Err(e) => error!(url = %self.ctx.url.display(), layer = key.layer, chunk = ?key.chunk, error = %e, "tile data skipped"),
        }
    }

    fn end_chunk(&mut self) -> Result<()> {
        let Some((layer, Some(chunk), format)) = self.ctx.data.as_ref().map(|d| (d.layer, d.chunk, d.format)) else {
            return Ok(());
        };
        self.decode_payload(TileDataKey{ layer, chunk: Some(chunk) }, format);
        if let Some(data) = &mut self.ctx.data {
            data.chunk = None;
        }
        Ok(())
    }

    fn end_data(&mut self) -> Result<()> {
        let Some(data) = self.ctx.data.take() else { return Ok(()) };
        if !data.has_chunks {
            self.decode_payload(TileDataKey{ layer: data.layer, chunk: None }, data.format);
        }
        Ok(())
    }

    fn start_tile(&mut self, attrs: &Attributes) -> Result<()> {
        if let Some(data) = &self.ctx.data {
            let key = TileDataKey{ layer: data.layer, chunk: data.chunk };
            if data.format.map_or(false, |f| f.encoding == Encoding::Xml) {
                let gid: u32 = attrs.or_default("gid")?;
                self.tile_buffer.entry(key).push(gid);
            }
            return Ok(());
        }

        let tileset = self.current_tileset()
            .ok_or_else(|| Error::structure("tile", "Tile outside of a tileset"))?;
        let id: u32 = attrs.required("id")?;
        let probability = attrs.or("probability", 1.)?;
        let type_ = attrs.get("type").or_else(|| attrs.get("class"));

        let data = self.map_mut()?.tilesets[tileset].tile_data_mut(id);
        if let Some(type_) = type_ {
            data.type_ = type_.to_string();
        }
        data.probability = probability;
        self.ctx.tile = Some(TileScope{ tileset, id });
        Ok(())
    }

    fn start_frame(&mut self, attrs: &Attributes) -> Result<()> {
        let scope = self.ctx.tile.ok_or_else(|| Error::structure("frame", "Animation frame outside of a tile"))?;
        let tile_id: u32 = attrs.required("tileid")?;
        let duration: u32 = attrs.required("duration")?;

        let tileset = &mut self.map_mut()?.tilesets[scope.tileset];
        let rect = tileset.tile_rect(tile_id);
        tileset.tile_data_mut(scope.id).animation.push(Frame{ tile_id, duration, rect });
        Ok(())
    }

    fn start_object(&mut self, attrs: &Attributes, worklist: &mut Worklist) -> Result<()> {
        let mut object = Object::from_attributes(attrs)?;

        if self.ctx.mode == DocumentKind::Template {
            self.ctx.template = Some(TemplateObject {
                attributes: attrs.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect(),
                object,
                tileset: self.ctx.template_tileset,
            });
            self.ctx.object = Some(ObjectScope::Template);
            return Ok(());
        }

        if !object.type_.is_empty() {
            object.extension = self.delegate.object_extension(&object.type_);
        }

        match self.ctx.top() {
            Some(Container::Collision) => {
                let scope = self.ctx.tile.ok_or_else(|| Error::structure("object", "Collision shape outside of a tile"))?;
                let collision = &mut self.map_mut()?.tilesets[scope.tileset].tile_data_mut(scope.id).collision;
                collision.push(object);
                let slot = collision.len() - 1;
                self.ctx.object = Some(ObjectScope::Collision{ tileset: scope.tileset, tile: scope.id, slot });
            }
            Some(Container::Layer(layer)) => {
                let template = attrs.get("template").map(|t| resolve_reference(&self.ctx.base_dir, t));
                if let Some(url) = &template {
                    object.template = Some(url.clone());
                    object.initialized = false;
                }

                let objects = match &mut self.map_mut()?.layers[layer].kind {
                    LayerKind::Object(objects) => &mut objects.objects,
                    _ => return Err(Error::structure("object", "Object outside of an object layer")),
                };
                objects.push(object);
                let handle = ObjectHandle{ layer, slot: objects.len() - 1 };

                if let Some(url) = template {
                    worklist.push(DocumentReference::new(url.clone(), DocumentKind::Template));
                    self.pending.push(url, handle);
                }
                self.ctx.object = Some(ObjectScope::Layer(handle));
            }
            _ => return Err(Error::structure("object", "Object outside of an object layer")),
        }
        Ok(())
    }

    fn object_mut(&mut self, scope: ObjectScope) -> Result<&mut Object> {
        let missing = || Error::structure("object", "Object vanished while it was read");
        match scope {
            ObjectScope::Template => self.ctx.template.as_mut().map(|t| &mut t.object).ok_or_else(missing),
            ObjectScope::Layer(handle) => match &mut self.map_mut()?.layers[handle.layer].kind {
                LayerKind::Object(layer) => layer.objects.get_mut(handle.slot).ok_or_else(missing),
                _ => Err(missing()),
            },
            ObjectScope::Collision{ tileset, tile, slot } => self.map_mut()?.tilesets[tileset]
                .tile_data_mut(tile)
                .collision
                .get_mut(slot)
                .ok_or_else(missing),
        }
    }

    fn end_object(&mut self) -> Result<()> {
        self.ctx.object = None;
        match self.ctx.template.take() {
            Some(template) => self.resolve_template(template),
            None => Ok(()),
        }
    }

    /// Apply a template to all objects that wait for it.
    fn resolve_template(&mut self, template: TemplateObject) -> Result<()> {
        let waiting = self.pending.take(&self.ctx.url);
        if waiting.is_empty() {
            debug!(url = %self.ctx.url.display(), "template is not used by any object");
        }

        let delegate = self.delegate;
        let Some(map) = self.map.as_mut() else {
            return Err(Error::structure("object", "Template read without a map"));
        };
        let Map{ layers, tilesets, .. } = map;
        for handle in waiting {
            let LayerKind::Object(layer) = &mut layers[handle.layer].kind else { continue };
            let Some(object) = layer.objects.get_mut(handle.slot) else { continue };
            if let Some(id) = apply_template(object, &template, tilesets)? {
                if self.template_tilesets.contains(&id) {
                    self.template_tiles.push((handle, id));
                }
            }
            if object.extension.is_none() && !object.type_.is_empty() {
                object.extension = delegate.object_extension(&object.type_);
            }
        }
        Ok(())
    }

    fn start_shape(&mut self, attrs: &Attributes) -> Result<()> {
        let Some(kind) = ObjectKind::from_element(attrs) else { return Ok(()) };
        let kind = kind?;
        let scope = self.ctx.object
            .ok_or_else(|| Error::structure(attrs.tag(), "Shape outside of an object"))?;
        self.object_mut(scope)?.set_kind(kind);
        Ok(())
    }

    fn end_text(&mut self) -> Result<()> {
        let content = self.ctx.take_characters();
        let Some(scope) = self.ctx.object else { return Ok(()) };
        if let ObjectKind::Text(text) = &mut self.object_mut(scope)?.kind {
            text.content = content;
        }
        Ok(())
    }

    fn start_property(&mut self, attrs: &Attributes) -> Result<()> {
        let name = attrs.get("name")
            .ok_or_else(|| Error::structure("property", "Property is missing a name!"))?;
        self.ctx.open_properties.push(OpenProperty {
            name: name.to_string(),
            type_: attrs.get("type").unwrap_or("string").to_string(),
            class: attrs.get("propertytype").unwrap_or_default().to_string(),
            value: attrs.get("value").map(str::to_string),
            members: PropertyContainer::new(),
        });
        Ok(())
    }

    fn end_property(&mut self) -> Result<()> {
        let text = self.ctx.take_characters();
        let open = self.ctx.open_properties.pop()
            .ok_or_else(|| Error::structure("property", "Unbalanced property element"))?;

        let value = if open.type_ == "class" {
            PropertyValue::Class{ class: open.class, members: open.members }
        } else {
            let value = open.value.unwrap_or(text);
            PropertyValue::parse(&open.type_, &open.name, &value)?
        };

        let bag = self.ctx.property_bags.last_mut()
            .ok_or_else(|| Error::structure("property", "Property outside of a properties element"))?;
        bag.insert(Property{ name: open.name, value });
        Ok(())
    }

    fn end_properties(&mut self) -> Result<()> {
        let Some(bag) = self.ctx.property_bags.pop() else { return Ok(()) };

        // members of a class property
        if let Some(open) = self.ctx.open_properties.last_mut() {
            open.members = bag;
            return Ok(());
        }
        if self.ignore_properties {
            return Ok(());
        }

        if let Some(scope) = self.ctx.object {
            self.object_mut(scope)?.properties.extend(bag);
            return Ok(());
        }
        let tile = self.ctx.tile;
        let top = self.ctx.top();
        let map = self.map_mut()?;
        let target = match (tile, top) {
            (Some(scope), _) => &mut map.tilesets[scope.tileset].tile_data_mut(scope.id).properties,
            (None, Some(Container::Map)) => &mut map.properties,
            (None, Some(Container::Tileset{ id, .. })) => &mut map.tilesets[id].properties,
            (None, Some(Container::Layer(index))) => &mut map.layers[index].properties,
            _ => return Ok(()),
        };
        target.extend(bag);
        Ok(())
    }
}

/// Give every tileset that only templates use a GID range behind all ranges of the map,
/// and move the tiles of the objects using it into that range.
fn place_template_tilesets(map: &mut Map, tilesets: &[TilesetId], objects: &[(ObjectHandle, TilesetId)]) {
    let mut provisional = HashMap::new();
    for &id in tilesets {
        let next = map.tileset_refs.iter()
            .map(|r| r.first_gid.saturating_add(map.tilesets[r.tileset].tilecount))
            .max()
            .unwrap_or(1)
            .max(1);
        let tileset = &mut map.tilesets[id];
        provisional.insert(id, tileset.first_gid);
        tileset.first_gid = next;
        map.tileset_refs.push(TilesetRef{ tileset: id, first_gid: next });
        debug!(tileset = %tileset.name, first_gid = next, "tileset only used by templates");
    }

    for &(handle, id) in objects {
        let Some(&from) = provisional.get(&id) else { continue };
        let to = map.tilesets[id].first_gid;
        let LayerKind::Object(layer) = &mut map.layers[handle.layer].kind else { continue };
        let Some(object) = layer.objects.get_mut(handle.slot) else { continue };
        if let Some(gid) = object.tile_id {
            object.tile_id = GID::from_raw(remap_gid(gid.as_raw(), from, to));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource_manager::{LazyLoader, Provider};
    use crate::NoDelegate;

    struct AllFilesExist;

    impl Provider for AllFilesExist {
        fn exists(&self, _: &Path) -> bool { true }
        fn is_dir(&self, _: &Path) -> bool { false }
        fn read(&mut self, _: &Path) -> Result<Vec<u8>> { Ok(Vec::new()) }
    }

    fn map_reference() -> DocumentReference {
        DocumentReference::new("/maps/test.tmx", DocumentKind::Map)
    }

    const HEADER: &str = r#"<map version="1.5" orientation="orthogonal" width="2" height="2" tilewidth="8" tileheight="8">"#;

    #[test]
    fn test_map_without_geometry_is_fatal() {
        let mut resources = ResourceManager::new(LazyLoader{}, AllFilesExist);
        let mut builder = DocumentBuilder::new(&mut resources, &NoDelegate, false);
        let mut worklist = Worklist::new();

        let err = builder.parse_document(&map_reference(), r#"<map orientation="orthogonal" width="2"/>"#, &mut worklist)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_layer_stack_and_groups() -> Result<()> {
        let mut resources = ResourceManager::new(LazyLoader{}, AllFilesExist);
        let mut builder = DocumentBuilder::new(&mut resources, &NoDelegate, false);
        let mut worklist = Worklist::new();
        let xml = format!(r#"{}
            <layer name="a" width="2" height="2"/>
            <group name="g">
                <objectgroup name="b"/>
                <group name="h"><imagelayer name="c"/></group>
            </group>
            <layer name="d" width="2" height="2"/>
        </map>"#, HEADER);
        builder.parse_document(&map_reference(), &xml, &mut worklist)?;

        let map = builder.map().unwrap();
        let names: Vec<_> = map.layers.iter().map(|l| (l.name.as_str(), l.parent)).collect();
        assert_eq!(names, vec![
            ("a", None), ("g", None), ("b", Some(1)), ("h", Some(1)), ("c", Some(3)), ("d", None),
        ]);
        assert_eq!(map.root_layers, vec![0, 1, 5]);
        assert_eq!(map.layers[1].as_group().map(|g| g.children.clone()), Some(vec![2, 3]));
        Ok(())
    }

    #[test]
    fn test_properties_go_to_current_node() -> Result<()> {
        let mut resources = ResourceManager::new(LazyLoader{}, AllFilesExist);
        let mut builder = DocumentBuilder::new(&mut resources, &NoDelegate, false);
        let mut worklist = Worklist::new();
        let xml = format!(r#"{}
            <properties><property name="music" value="theme.ogg"/></properties>
            <tileset firstgid="1" name="t" tilewidth="8" tileheight="8" tilecount="4" columns="2">
                <properties><property name="kind" value="terrain"/></properties>
                <tile id="2" type="water">
                    <properties><property name="speed" type="float" value="0.5"/></properties>
                </tile>
            </tileset>
            <objectgroup name="o">
                <properties><property name="layer" type="int" value="3"/></properties>
                <object id="1" x="0" y="0">
                    <properties>
                        <property name="note">multi
line</property>
                        <property name="pos" type="class" propertytype="Vec">
                            <properties><property name="x" type="int" value="4"/></properties>
                        </property>
                    </properties>
                </object>
            </objectgroup>
        </map>"#, HEADER);
        builder.parse_document(&map_reference(), &xml, &mut worklist)?;

        let map = builder.map().unwrap();
        assert_eq!(map.properties.get("music").and_then(|v| v.as_str()), Some("theme.ogg"));
        let tileset = &map.tilesets[0];
        assert_eq!(tileset.properties.get("kind").and_then(|v| v.as_str()), Some("terrain"));
        assert_eq!(tileset.tiles[&2].type_, "water");
        assert_eq!(tileset.tiles[&2].properties.get("speed"), Some(&PropertyValue::Float(0.5)));
        assert!(tileset.properties.get("speed").is_none());

        let layer = &map.layers[0];
        assert_eq!(layer.properties.get("layer").and_then(PropertyValue::as_int), Some(3));
        let object = &layer.as_object_layer().unwrap().objects[0];
        assert_eq!(object.properties.get("note").and_then(|v| v.as_str()), Some("multi\nline"));
        match object.properties.get("pos") {
            Some(PropertyValue::Class{ class, members }) => {
                assert_eq!(class, "Vec");
                assert_eq!(members.get("x").and_then(PropertyValue::as_int), Some(4));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(layer.properties.get("note").is_none());
        Ok(())
    }

    #[test]
    fn test_xml_encoded_cells() -> Result<()> {
        let mut resources = ResourceManager::new(LazyLoader{}, AllFilesExist);
        let mut builder = DocumentBuilder::new(&mut resources, &NoDelegate, false);
        let mut worklist = Worklist::new();
        let xml = format!(r#"{}
            <layer name="a" width="2" height="2">
                <data><tile gid="1"/><tile/><tile gid="2147483650"/><tile gid="3"/></data>
            </layer>
        </map>"#, HEADER);
        builder.parse_document(&map_reference(), &xml, &mut worklist)?;

        let (_, buffer, _) = builder.finish()?;
        assert_eq!(buffer.get(TileDataKey{ layer: 0, chunk: None }), Some(&[1, 0, 0x80000002, 3][..]));
        Ok(())
    }

    #[test]
    fn test_bad_compression_skips_only_the_data() -> Result<()> {
        let mut resources = ResourceManager::new(LazyLoader{}, AllFilesExist);
        let mut builder = DocumentBuilder::new(&mut resources, &NoDelegate, false);
        let mut worklist = Worklist::new();
        let xml = format!(r#"{}
            <layer name="a" width="2" height="2">
                <data encoding="base64" compression="lzma">AAAA</data>
            </layer>
            <layer name="b" width="2" height="2">
                <data encoding="csv">1,0,0,1</data>
            </layer>
        </map>"#, HEADER);
        builder.parse_document(&map_reference(), &xml, &mut worklist)?;

        let (map, buffer, _) = builder.finish()?;
        assert_eq!(map.layers.len(), 2);
        assert_eq!(buffer.get(TileDataKey{ layer: 0, chunk: None }), None);
        assert_eq!(buffer.get(TileDataKey{ layer: 1, chunk: None }), Some(&[1, 0, 0, 1][..]));
        Ok(())
    }

    #[test]
    fn test_shape_without_object_aborts() {
        let mut resources = ResourceManager::new(LazyLoader{}, AllFilesExist);
        let mut builder = DocumentBuilder::new(&mut resources, &NoDelegate, false);
        let mut worklist = Worklist::new();
        let xml = format!(r#"{}<objectgroup name="o"><ellipse/></objectgroup></map>"#, HEADER);
        let err = builder.parse_document(&map_reference(), &xml, &mut worklist).unwrap_err();
        assert!(!err.is_fatal());
    }
}
