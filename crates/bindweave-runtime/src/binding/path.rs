#![forbid(unsafe_code)]

//! Compiled accessor paths.
//!
//! A [`Path`] is the parsed form of `a.b[0]["c d"]`: a list of typed
//! [`PathSegment`]s. Reading walks any [`Value`]; writing starts at an
//! element's fields and refuses to continue through an intermediate element.

use std::borrow::Cow;
use std::fmt;

use crate::dom::ElementRef;
use crate::error::PathError;
use crate::reactive::DynamicRecord;
use crate::value::Value;

/// One accessor step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl PathSegment {
    /// The segment as a property key. Indices render as decimal text.
    #[must_use]
    pub fn key(&self) -> Cow<'_, str> {
        match self {
            Self::Field(name) => Cow::Borrowed(name),
            Self::Index(index) => Cow::Owned(index.to_string()),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        Self::Field(name.to_owned())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Ordered list of accessor steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<PathSegment>);

impl Path {
    #[must_use]
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Build a field-only path from dotted text. Does not parse brackets.
    #[must_use]
    pub fn dotted(text: &str) -> Self {
        Self(
            text.split('.')
                .filter(|s| !s.is_empty())
                .map(PathSegment::from)
                .collect(),
        )
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is exactly the single segment `id`.
    #[must_use]
    pub fn is_id(&self) -> bool {
        matches!(self.0.as_slice(), [PathSegment::Field(name)] if name == "id")
    }

    /// Every segment rendered as a key: `a.b[0]` gives `["a", "b", "0"]`.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|s| s.key().into_owned()).collect()
    }

    /// Resolve the path against `root`.
    pub fn read(&self, root: &Value) -> Result<Value, PathError> {
        let mut current = root.clone();
        for segment in &self.0 {
            current = read_segment(&current, segment).ok_or_else(|| PathError::MissingSegment {
                path: self.to_string(),
                segment: segment.to_string(),
            })?;
        }
        Ok(current)
    }

    /// Write `value` through this path, starting at `element`'s fields.
    ///
    /// The first segment names an element field. Every following step must
    /// land on an object or list; a missing step or an element-valued step
    /// stops the write. Observable objects are written with
    /// [`DynamicRecord::update_property`], so their own listeners fire.
    pub fn write(&self, element: &ElementRef, value: Value) -> Result<(), PathError> {
        let Some((first, rest)) = self.0.split_first() else {
            return Err(PathError::Empty);
        };
        let Some((last, middle)) = rest.split_last() else {
            element.set_field(&first.key(), value);
            return Ok(());
        };

        let mut current = element
            .field(&first.key())
            .ok_or_else(|| self.missing(first))?;
        let mut current_segment = first;
        for segment in middle {
            if matches!(current, Value::Element(_)) {
                return Err(self.element_intermediate(current_segment));
            }
            current = read_segment(&current, segment).ok_or_else(|| self.missing(segment))?;
            current_segment = segment;
        }

        match current {
            Value::Element(_) => Err(self.element_intermediate(current_segment)),
            Value::Object(object) => {
                let _ = object.update_property(&last.key(), value);
                Ok(())
            }
            Value::List(list) => match last {
                PathSegment::Index(index) => {
                    if list.set(*index, value) {
                        Ok(())
                    } else {
                        Err(PathError::IndexOutOfBounds {
                            path: self.to_string(),
                            index: *index,
                            len: list.len(),
                        })
                    }
                }
                PathSegment::Field(_) => Err(self.not_a_container(last)),
            },
            Value::Null => Err(self.missing(current_segment)),
            _ => Err(self.not_a_container(last)),
        }
    }

    fn missing(&self, segment: &PathSegment) -> PathError {
        PathError::MissingSegment {
            path: self.to_string(),
            segment: segment.to_string(),
        }
    }

    fn element_intermediate(&self, segment: &PathSegment) -> PathError {
        PathError::ElementIntermediate {
            path: self.to_string(),
            segment: segment.to_string(),
        }
    }

    fn not_a_container(&self, segment: &PathSegment) -> PathError {
        PathError::NotAContainer {
            path: self.to_string(),
            segment: segment.to_string(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => f.write_str(name)?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl FromIterator<PathSegment> for Path {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Apply one accessor step to `value`.
///
/// Objects and elements are keyed by the segment's text; lists accept
/// index segments only. Anything else has no fields.
#[must_use]
pub fn read_segment(value: &Value, segment: &PathSegment) -> Option<Value> {
    match value {
        Value::Object(object) => object.get_property(&segment.key()),
        Value::Element(element) => element.field(&segment.key()),
        Value::List(list) => match segment {
            PathSegment::Index(index) => list.get(*index),
            PathSegment::Field(_) => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ObjectRef;
    use crate::value::ListRef;

    fn path(segments: Vec<PathSegment>) -> Path {
        Path::new(segments)
    }

    #[test]
    fn display_and_strings() {
        let p = path(vec!["a".into(), "b".into(), PathSegment::Index(0)]);
        assert_eq!(p.to_string(), "a.b[0]");
        assert_eq!(p.to_strings(), ["a", "b", "0"]);
    }

    #[test]
    fn id_detection() {
        assert!(Path::dotted("id").is_id());
        assert!(!Path::dotted("id.x").is_id());
        assert!(!Path::dotted("ident").is_id());
    }

    #[test]
    fn read_through_objects_and_lists() {
        let tags: ListRef = ["x", "y"].into_iter().collect();
        let root = Value::from(ObjectRef::plain().with("user", ObjectRef::plain().with("tags", tags)));
        let p = path(vec!["user".into(), "tags".into(), PathSegment::Index(1)]);
        assert_eq!(p.read(&root), Ok(Value::from("y")));

        let missing = Path::dotted("user.name");
        assert!(matches!(missing.read(&root), Err(PathError::MissingSegment { .. })));
    }

    #[test]
    fn single_segment_write_sets_field() {
        let element = ElementRef::new("span");
        Path::dotted("label").write(&element, Value::from("hi")).unwrap();
        assert_eq!(element.field("label"), Some(Value::from("hi")));
    }

    #[test]
    fn nested_write_into_object() {
        let style = ObjectRef::plain();
        let element = ElementRef::new("span").with_field("style", style.clone());
        Path::dotted("style.color").write(&element, Value::from("red")).unwrap();
        assert_eq!(style.get_property("color"), Some(Value::from("red")));
    }

    #[test]
    fn nested_write_stops_on_missing_intermediate() {
        let element = ElementRef::new("span");
        let err = Path::dotted("style.color")
            .write(&element, Value::from("red"))
            .unwrap_err();
        assert_eq!(
            err,
            PathError::MissingSegment {
                path: "style.color".into(),
                segment: "style".into()
            }
        );
    }

    #[test]
    fn nested_write_refuses_element_intermediate() {
        let other = ElementRef::new("div");
        let element = ElementRef::new("span").with_field("owner", other.clone());
        let err = Path::dotted("owner.title")
            .write(&element, Value::from("x"))
            .unwrap_err();
        assert!(matches!(err, PathError::ElementIntermediate { .. }));
        assert_eq!(other.field("title"), None);
    }

    #[test]
    fn index_write_checks_bounds() {
        let list: ListRef = [1].into_iter().collect();
        let element = ElementRef::new("ul").with_field("items", list.clone());
        path(vec!["items".into(), PathSegment::Index(0)])
            .write(&element, Value::from(7))
            .unwrap();
        assert_eq!(list.get(0), Some(Value::from(7)));
        let err = path(vec!["items".into(), PathSegment::Index(4)])
            .write(&element, Value::from(7))
            .unwrap_err();
        assert!(matches!(err, PathError::IndexOutOfBounds { len: 1, .. }));
    }

    #[test]
    fn empty_path_is_rejected() {
        let element = ElementRef::new("p");
        assert_eq!(Path::default().write(&element, Value::Null), Err(PathError::Empty));
    }
}
