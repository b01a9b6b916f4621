//! Applying object templates (`.tx` files) to the objects that use them.

use crate::{gid, object::Object, tileset::{TileSet, TilesetId}, Result, GID};

/// The object read from a template file.
#[derive(Debug, Default)]
pub(crate) struct TemplateObject {
    /// Attributes of the template's `object` element, in document order.
    pub attributes: Vec<(String, String)>,
    /// Shape, tile and properties of the template.
    pub object: Object,
    /// Tileset the template's gid refers to, with the first GID the template assigns it.
    pub tileset: Option<(TilesetId, u32)>,
}

/// Move a raw tile id from one GID range to another, keeping its flip flags.
pub fn remap_gid(raw: u32, from_first_gid: u32, to_first_gid: u32) -> u32 {
    let (id, flip) = gid::decode(raw);
    let local_id = id.saturating_sub(from_first_gid);
    gid::encode(local_id + to_first_gid, flip)
}

/// Fill in everything `placeholder` did not set itself from `template`.
///
/// Returns the tileset the template's tile was moved into, if any.
pub(crate) fn apply_template(placeholder: &mut Object, template: &TemplateObject, tilesets: &[TileSet]) -> Result<Option<TilesetId>> {
    let mut remapped_into = None;
    for (name, value) in &template.attributes {
        match name.as_str() {
            "id" | "gid" | "template" => {}
            name if placeholder.is_explicit(name) => {}
            name => { placeholder.apply_attribute(name, value)?; }
        }
    }

    if placeholder.tile_id.is_none() && !placeholder.is_explicit("gid") {
        if let Some(template_gid) = template.object.tile_id {
            let raw = match template.tileset.and_then(|(id, first)| Some((tilesets.get(id)?, first))) {
                Some((tileset, template_first_gid)) => {
                    remapped_into = Some(tileset.id);
                    remap_gid(template_gid.as_raw(), template_first_gid, tileset.first_gid)
                }
                None => template_gid.as_raw(),
            };
            placeholder.tile_id = GID::from_raw(raw);
        }
    }

    if !placeholder.has_explicit_shape() {
        placeholder.kind = template.object.kind.clone();
    }
    placeholder.properties.inherit(&template.object.properties);
    placeholder.initialized = true;
    Ok(remapped_into)
}
