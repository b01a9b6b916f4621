//! This module provides functionality for custom
//! [properties](https://doc.mapeditor.org/en/stable/reference/tmx-map-format/#properties)

use crate::{attributes::parse_flag, Color, Error, Result};

/// Reference type to an object stored in this map.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct ObjectReference(pub u32);

#[derive(Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Color(Color),
    File(String),
    /// Zero means "no object".
    Object(ObjectReference),
    /// A custom class, its members are nested properties.
    Class{ class: String, members: PropertyContainer },
}

impl PropertyValue {
    /// Parse the textual value of a property with the given Tiled type name.
    pub(crate) fn parse(type_: &str, name: &str, value: &str) -> Result<Self> {
        use PropertyValue::*;

        Ok(match type_ {
            "string" => String(value.to_string()),
            "int" => Int(value.trim().parse()?),
            "float" => Float(value.trim().parse()?),
            "bool" => Bool(parse_flag(value)?),
            "color" if value.trim().is_empty() => Color(crate::Color::default()),
            "color" => Color(value.trim().parse()?),
            "file" => File(value.to_string()),
            "object" if value.trim().is_empty() => Object(ObjectReference(0)),
            "object" => Object(ObjectReference(value.trim().parse()?)),
            other => return Err(Error::StructureError{
                tag: "property".into(),
                msg: format!("Unknown property type '{}' for property '{}'", other, name),
            }),
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) | PropertyValue::File(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

/// Ordered set of custom properties attached to a map, layer, tileset, tile or object.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct PropertyContainer {
    properties: Vec<Property>
}

impl PropertyContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn iter(&self) -> impl Iterator<Item=&Property> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Add a property, replacing an existing one with the same name.
    pub fn insert(&mut self, property: Property) {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    /// Add all properties of `other`, later values win.
    pub(crate) fn extend(&mut self, other: PropertyContainer) {
        for property in other.properties {
            self.insert(property);
        }
    }

    /// Add the properties of `fallback` that are not present in self.
    pub(crate) fn inherit(&mut self, fallback: &PropertyContainer) {
        for property in &fallback.properties {
            if self.get(&property.name).is_none() {
                self.properties.push(property.clone());
            }
        }
    }
}
