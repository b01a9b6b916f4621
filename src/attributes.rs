//! Typed access to the attributes of a single XML start element.

use std::str::FromStr;

use xml::attribute::OwnedAttribute;

use crate::{math, Error, Result};

/// Attributes of one start element, together with its tag name for error reporting.
#[derive(Clone, Copy)]
pub(crate) struct Attributes<'a> {
    tag: &'a str,
    attrs: &'a [OwnedAttribute],
}

impl<'a> Attributes<'a> {
    pub fn new(tag: &'a str, attrs: &'a [OwnedAttribute]) -> Self {
        Self { tag, attrs }
    }

    pub fn tag(&self) -> &'a str {
        self.tag
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.attrs.iter()
            .find(|a| a.name.local_name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item=(&'a str, &'a str)> + 'a {
        self.attrs.iter().map(|a| (a.name.local_name.as_str(), a.value.as_str()))
    }

    pub fn required_str(&self, name: &str) -> Result<&'a str> {
        self.get(name).ok_or_else(|| Error::structure(self.tag, format!("Required attribute '{}' missing", name)))
    }

    pub fn required<T>(&self, name: &str) -> Result<T>
        where T: FromStr,
              Error: From<T::Err>
    {
        Ok(self.required_str(name)?.trim().parse()?)
    }

    pub fn or<T>(&self, name: &str, alternative: T) -> Result<T>
        where T: FromStr,
              Error: From<T::Err>
    {
        match self.get(name) {
            None => Ok(alternative),
            Some(text) => Ok(text.trim().parse()?),
        }
    }

    pub fn or_default<T>(&self, name: &str) -> Result<T>
        where T: Default + FromStr,
              Error: From<T::Err>
    {
        self.or(name, T::default())
    }

    /// Tiled writes booleans as `0`/`1`, but `true`/`false` are accepted too.
    pub fn flag(&self, name: &str, alternative: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(alternative),
            Some(text) => parse_flag(text),
        }
    }

    pub fn fvec2_or_default(&self, x_attr: &str, y_attr: &str) -> Result<math::fvec2> {
        Ok(math::fvec2::new(self.or_default(x_attr)?, self.or_default(y_attr)?))
    }
}

pub(crate) fn parse_flag(text: &str) -> Result<bool> {
    match text.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Ok(other.parse()?),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use xml::name::OwnedName;

    fn attr(name: &str, value: &str) -> OwnedAttribute {
        OwnedAttribute::new(OwnedName::local(name), value)
    }

    #[test]
    fn test_required_and_optional() -> Result<()> {
        let raw = vec![attr("width", "10"), attr("visible", "0"), attr("opacity", "0.5")];
        let attrs = Attributes::new("layer", &raw);

        assert_eq!(attrs.required::<u32>("width")?, 10);
        assert_eq!(attrs.or("height", 3u32)?, 3);
        assert_eq!(attrs.or::<f32>("opacity", 1.)?, 0.5);
        assert!(!attrs.flag("visible", true)?);

        match attrs.required::<u32>("height") {
            Err(Error::StructureError{ tag, .. }) => assert_eq!(tag, "layer"),
            _ => panic!("expected a structure error"),
        }
        Ok(())
    }

    #[test]
    fn test_malformed_value() {
        let raw = vec![attr("width", "ten")];
        let attrs = Attributes::new("map", &raw);
        assert!(matches!(attrs.required::<u32>("width"), Err(Error::ParseError(_))));
    }
}
