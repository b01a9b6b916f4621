use std::any::Any;
use std::path::PathBuf;

use crate::{
    attributes::{parse_flag, Attributes},
    layer::Tile,
    math, Color, Error, PropertyContainer, Result, GID,
};

/// An element of an [ObjectLayer](crate::ObjectLayer).
/// Objects do not need to be aligned to the normal tile grid.
/// Objects can have different kinds,
/// (e.g. rect, ellipse, text).
/// See [ObjectKind] for more info.
#[derive(Debug)]
#[non_exhaustive]
pub struct Object {
    pub id: u32,
    pub name: String,
    pub type_: String,
    pub pos: math::fvec2,
    pub size: math::fvec2,
    pub rotation: f32,
    /// Tile shown by this object, with flip flags.
    pub tile_id: Option<GID>,
    /// The tile behind [Object::tile_id], filled in once the map finished loading.
    pub tile: Option<Tile>,
    pub visible: bool,
    /// False while the object waits for its template.
    pub initialized: bool,
    /// Template file this object is based on.
    pub template: Option<PathBuf>,
    pub kind: ObjectKind,
    pub properties: PropertyContainer,
    /// Custom data attached by the [TilemapDelegate](crate::TilemapDelegate) for the object type.
    pub extension: Option<Box<dyn Any + Send + Sync>>,

    /// Attributes written on the object element itself, they win over template values.
    explicit: Vec<String>,
    shape_explicit: bool,
}

impl Default for Object {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            type_: String::new(),
            pos: math::fvec2::default(),
            size: math::fvec2::default(),
            rotation: 0.,
            tile_id: None,
            tile: None,
            visible: true,
            initialized: true,
            template: None,
            kind: ObjectKind::Rect,
            properties: PropertyContainer::new(),
            extension: None,
            explicit: Vec::new(),
            shape_explicit: false,
        }
    }
}

impl Object {
    /// Build an object from the attributes of an `object` element.
    /// The `template` attribute is not resolved here.
    pub(crate) fn from_attributes(attrs: &Attributes) -> Result<Self> {
        let mut object = Object::default();
        for (name, value) in attrs.iter() {
            if object.apply_attribute(name, value)? {
                object.explicit.push(name.to_string());
            }
        }
        Ok(object)
    }

    /// Set a single attribute. Returns whether the attribute is known.
    pub(crate) fn apply_attribute(&mut self, name: &str, value: &str) -> Result<bool> {
        match name {
            "id" => self.id = value.trim().parse()?,
            "name" => self.name = value.to_string(),
            "type" | "class" => self.type_ = value.to_string(),
            "x" => self.pos.x = value.trim().parse()?,
            "y" => self.pos.y = value.trim().parse()?,
            "width" => self.size.x = value.trim().parse()?,
            "height" => self.size.y = value.trim().parse()?,
            "rotation" => self.rotation = value.trim().parse()?,
            "gid" => self.tile_id = GID::from_raw(value.trim().parse()?),
            "visible" => self.visible = parse_flag(value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Whether `attribute` was written on the object element.
    pub fn is_explicit(&self, attribute: &str) -> bool {
        self.explicit.iter().any(|a| a == attribute)
    }

    pub(crate) fn set_kind(&mut self, kind: ObjectKind) {
        self.kind = kind;
        self.shape_explicit = true;
    }

    pub(crate) fn has_explicit_shape(&self) -> bool {
        self.shape_explicit
    }

    /// Whether a renderer should show this object.
    pub fn is_shown(&self) -> bool {
        self.visible && self.initialized
    }
}

/// Text content and style of a text object.
#[derive(Debug, PartialEq, Clone)]
pub struct Text {
    pub content: String,
    pub fontfamily: String,
    pub pixelsize: u32,
    pub wrap: bool,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
    pub halign: String,
    pub valign: String,
}

impl Text {
    pub(crate) fn from_attributes(attrs: &Attributes) -> Result<Self> {
        Ok(Self {
            content: String::new(),
            fontfamily: attrs.get("fontfamily").unwrap_or("sans-serif").to_string(),
            pixelsize: attrs.or("pixelsize", 16)?,
            wrap: attrs.flag("wrap", false)?,
            color: attrs.or("color", Color::from_argb(255, 0, 0, 0))?,
            bold: attrs.flag("bold", false)?,
            italic: attrs.flag("italic", false)?,
            halign: attrs.get("halign").unwrap_or("left").to_string(),
            valign: attrs.get("valign").unwrap_or("top").to_string(),
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum ObjectKind {
    Rect,
    Ellipse,
    Point,
    Polygon {
        points: Vec<math::fvec2>
    },
    Polyline {
        points: Vec<math::fvec2>
    },
    Text(Text),
}

trait AsPointListExt { fn as_point_list(&self) -> Result<Vec<math::fvec2>>; }

impl AsPointListExt for &str {
    fn as_point_list(&self) -> Result<Vec<math::fvec2>> {
        let mut points = vec![];
        for point in self.split_ascii_whitespace() {
            let mut coords = point.split(',');
            if let (Some(x), Some(y), None) = (coords.next(), coords.next(), coords.next()) {
                points.push(math::fvec2::new(x.parse()?,y.parse()?));
            } else {
                return Err(Error::ParseError(format!("{} is not a valid point", point).into()));
            }
        }
        Ok(points)
    }
}

impl ObjectKind {
    /// Shape described by a child element of `object`, None for unrelated elements.
    pub(crate) fn from_element(attrs: &Attributes) -> Option<Result<Self>> {
        Some(match attrs.tag() {
            "ellipse" => Ok(ObjectKind::Ellipse),
            "point" => Ok(ObjectKind::Point),
            poly @ ("polygon" | "polyline") => attrs.required_str("points")
                .and_then(|p| p.as_point_list())
                .map(|points| match poly {
                    "polygon" => ObjectKind::Polygon{ points },
                    _ => ObjectKind::Polyline{ points },
                }),
            "text" => Text::from_attributes(attrs).map(ObjectKind::Text),
            _ => return None,
        })
    }
}
