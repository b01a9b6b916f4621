//! Hooks for code that wants to follow the progress of a load.

use std::any::Any;

use crate::{Layer, Map, TileSet};

/// Callbacks invoked while a map is loaded.
///
/// All methods have empty default implementations.
/// The order of the calls is fixed:
///
/// 1. [on_document_parsing_began](TilemapDelegate::on_document_parsing_began) once the `map` element was read.
/// 2. [on_tileset_added](TilemapDelegate::on_tileset_added) and [on_layer_added](TilemapDelegate::on_layer_added)
///    while the files are parsed, at the closing tag of the element.
/// 3. [on_document_read](TilemapDelegate::on_document_read) once all files are parsed.
/// 4. [on_layer_rendered](TilemapDelegate::on_layer_rendered) for every layer, in no particular order,
///    but never concurrently.
/// 5. [on_document_rendered](TilemapDelegate::on_document_rendered) exactly once, after all layers.
pub trait TilemapDelegate: Sync {
    fn on_document_parsing_began(&self, _map: &Map) {}

    fn on_document_read(&self, _map: &Map) {}

    fn on_tileset_added(&self, _tileset: &TileSet) {}

    fn on_layer_added(&self, _layer: &Layer) {}

    fn on_layer_rendered(&self, _layer: &Layer) {}

    fn on_document_rendered(&self, _map: &Map) {}

    /// Custom data to attach to objects of the given type.
    ///
    /// Called for each object once its type is known,
    /// objects based on a template are asked again after the template was applied.
    fn object_extension(&self, _type_name: &str) -> Option<Box<dyn Any + Send + Sync>> {
        None
    }
}

/// Delegate that ignores all events.
pub struct NoDelegate;

impl TilemapDelegate for NoDelegate {}
