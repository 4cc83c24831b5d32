// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::Offset;
use nohash_hasher::IntMap;
use std::collections::hash_map::Iter;

/// The logical level of a line.
///
/// The mapping between logical and physical levels depends on the
/// active-low setting as follows:
///
/// |             | Physical Low | Physical High |
/// |-------------|--------------|---------------|
/// | **Active-High** | Inactive | Active |
/// | **Active-Low**  | Active | Inactive |
///
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Value {
    /// The line is inactive.
    #[default]
    Inactive,
    /// The line is active.
    Active,
}

impl Value {
    /// The value opposite the current value.
    pub fn not(&self) -> Value {
        match self {
            Value::Active => Value::Inactive,
            Value::Inactive => Value::Active,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Active => write!(f, "active"),
            Value::Inactive => write!(f, "inactive"),
        }
    }
}

impl From<Value> for bool {
    fn from(v: Value) -> bool {
        v == Value::Active
    }
}

impl From<Value> for u8 {
    fn from(v: Value) -> u8 {
        u8::from(bool::from(v))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        if b {
            Value::Active
        } else {
            Value::Inactive
        }
    }
}

impl From<u8> for Value {
    fn from(i: u8) -> Value {
        Value::from(i != 0)
    }
}

/// A collection of line values.
///
/// Lines are identified by their offset, not their position in a request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Values(IntMap<Offset, Value>);

impl Values {
    /// Construct a `Values` collection for a set of line offsets.
    ///
    /// Typically used to select the lines to be read by
    /// [`Request::values_into`](crate::request::Request::values_into).
    ///
    /// All lines are set to inactive.
    pub fn from_offsets(offsets: &[Offset]) -> Values {
        let mut values = Values::default();
        for offset in offsets {
            values.set(*offset, Value::Inactive);
        }
        values
    }

    /// Get the value of a line.
    #[inline]
    pub fn get(&self, offset: Offset) -> Option<Value> {
        self.0.get(&offset).copied()
    }

    /// Set the value of a line.
    #[inline]
    pub fn set(&mut self, offset: Offset, val: Value) -> &mut Self {
        self.0.insert(offset, val);
        self
    }

    /// Toggle the value of a line.
    ///
    /// If not already set then sets the line active.
    #[inline]
    pub fn toggle(&mut self, offset: Offset) -> &mut Self {
        let val = self.get(offset).unwrap_or_default();
        self.0.insert(offset, val.not());
        self
    }

    /// Remove any value setting for a line.
    #[inline]
    pub fn unset(&mut self, offset: Offset) -> &mut Self {
        self.0.remove(&offset);
        self
    }

    /// The number of lines for which values are contained in this set.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Return true if the values is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return true if the values contain a value for the line.
    #[inline]
    pub fn contains(&self, offset: Offset) -> bool {
        self.0.contains_key(&offset)
    }

    /// An iterator to visit all values, in arbitrary order.
    pub fn iter(&self) -> Iter<'_, Offset, Value> {
        self.0.iter()
    }
}

impl FromIterator<(Offset, Value)> for Values {
    fn from_iter<I: IntoIterator<Item = (Offset, Value)>>(iter: I) -> Self {
        Values(iter.into_iter().collect())
    }
}
