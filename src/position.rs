//! Named screen positions and the ordered, fixed-schema collection of them.
//!
//! A position is either fully unset (the `(-1, -1)` sentinel) or fully set
//! (both coordinates `>= 0`). `Coordinates::new` refuses anything in between,
//! so the engine can never produce a partial state.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Result, StagePilotError};

/// Sentinel coordinate value marking an unset position
pub const UNSET: i32 = -1;

/// A screen coordinate pair, possibly the unset sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

impl Coordinates {
    /// The unset sentinel `(-1, -1)`
    pub const UNSET: Self = Self { x: UNSET, y: UNSET };

    /// Create validated coordinates.
    ///
    /// # Errors
    ///
    /// `InvalidCoordinates` unless both values are `>= 0` or both are `-1`.
    pub fn new(x: i32, y: i32) -> Result<Self> {
        let coords = Self { x, y };
        if coords.is_valid() {
            Ok(coords)
        } else {
            Err(StagePilotError::InvalidCoordinates { x, y })
        }
    }

    /// True if neither coordinate is the sentinel
    #[inline]
    pub fn is_set(&self) -> bool {
        self.x != UNSET && self.y != UNSET
    }

    /// True for a fully set or fully unset pair
    pub fn is_valid(&self) -> bool {
        (self.x >= 0 && self.y >= 0) || *self == Self::UNSET
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::UNSET
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_set() {
            write!(f, "({}, {})", self.x, self.y)
        } else {
            write!(f, "(unset)")
        }
    }
}

/// A named screen coordinate used as a UI-automation target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub name: String,
    #[serde(flatten)]
    pub coordinates: Coordinates,
}

impl Position {
    /// Create an unset position
    pub fn unset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coordinates: Coordinates::UNSET,
        }
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.coordinates.is_set()
    }
}

/// Ordered mapping from position name to coordinates.
///
/// The key set is fixed when the collection is built; only values change
/// afterwards. Iteration follows insertion (schema) order, and so does the
/// serialized form, which is a map of `name -> { x, y }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionCollection {
    entries: Vec<Position>,
}

impl PositionCollection {
    /// Build a collection where every schema name is unset.
    ///
    /// Duplicate names keep their first occurrence.
    pub fn from_schema<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<Position> = Vec::new();
        for name in names {
            let name = name.into();
            if !entries.iter().any(|p| p.name == name) {
                entries.push(Position::unset(name));
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|p| p.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Position> {
        self.entries.iter().find(|p| p.name == name)
    }

    /// Overwrite the coordinates of an existing entry.
    ///
    /// # Errors
    ///
    /// `UnknownPosition` if `name` is not part of the schema; the collection
    /// is left untouched.
    pub fn set(&mut self, name: &str, coordinates: Coordinates) -> Result<Coordinates> {
        let entry = self
            .entries
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| StagePilotError::unknown_position(name))?;
        Ok(std::mem::replace(&mut entry.coordinates, coordinates))
    }

    /// Set every entry to the unset sentinel
    pub fn clear_all(&mut self) {
        for entry in &mut self.entries {
            entry.coordinates = Coordinates::UNSET;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|p| p.name.as_str())
    }

    /// True iff every position in the schema is set
    pub fn is_fully_configured(&self) -> bool {
        self.entries.iter().all(Position::is_set)
    }

    /// Names of positions still holding the sentinel, in schema order
    pub fn unset_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|p| !p.is_set())
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Reorder and reshape this collection to exactly match `schema`.
    ///
    /// Names missing from the collection are added unset and returned in the
    /// first list. Names outside the schema are dropped and returned in the
    /// second list, so the caller decides whether that is an error.
    pub fn conform_to_schema(&mut self, schema: &[&str]) -> (Vec<String>, Vec<String>) {
        let mut added = Vec::new();
        let mut conformed = Vec::with_capacity(schema.len());

        for name in schema {
            match self.entries.iter().position(|p| p.name == *name) {
                Some(idx) => conformed.push(self.entries.swap_remove(idx)),
                None => {
                    added.push((*name).to_string());
                    conformed.push(Position::unset(*name));
                }
            }
        }

        let extra = self.entries.drain(..).map(|p| p.name).collect();
        self.entries = conformed;
        (added, extra)
    }
}

impl Serialize for PositionCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.name, &entry.coordinates)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PositionCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct CollectionVisitor;

        impl<'de> Visitor<'de> for CollectionVisitor {
            type Value = PositionCollection;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of position name -> { x, y }")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries: Vec<Position> = Vec::new();
                while let Some((name, coordinates)) =
                    access.next_entry::<String, Coordinates>()?
                {
                    if !coordinates.is_valid() {
                        return Err(serde::de::Error::custom(format!(
                            "position '{}' has partial coordinates ({}, {})",
                            name, coordinates.x, coordinates.y
                        )));
                    }
                    if entries.iter().any(|p| p.name == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate position '{}'",
                            name
                        )));
                    }
                    entries.push(Position { name, coordinates });
                }
                Ok(PositionCollection { entries })
            }
        }

        deserializer.deserialize_map(CollectionVisitor)
    }
}
