//! An insertion-ordered multimap for the attribute column.

use std::collections::HashMap;
use std::fmt;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};

//-----------------------------------------------------------------------------

/// Attributes of a feature: an ordered multimap from keys to lists of values.
///
/// Values are always lists, even when the file had a single value. A key may
/// be present with an empty value list (e.g. the bare `Complete` token some
/// gene predictors emit). Iteration follows the order in which the keys were
/// first inserted, which is the order they appeared on the original line.
///
/// Serializes to and from a JSON object whose values are arrays of strings,
/// preserving key order. This is the representation stored in the
/// `attributes` column of the database.
#[derive(Clone, Debug, Default)]
pub struct Attributes {
    entries: Vec<(String, Vec<String>)>,
    positions: HashMap<String, usize>,
}

impl Attributes {
    /// Creates an empty attribute map.
    pub fn new() -> Self {
        Attributes::default()
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if the key is present, even with an empty value list.
    pub fn contains_key(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Returns the values for the key, or [`None`] if the key is absent.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.positions.get(key).map(|offset| self.entries[*offset].1.as_slice())
    }

    /// Returns a mutable reference to the values for the key.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Vec<String>> {
        let offset = *self.positions.get(key)?;
        Some(&mut self.entries[offset].1)
    }

    /// Returns the first value for the key, or [`None`] if the key is absent
    /// or has no values.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)?.first().map(|value| value.as_str())
    }

    /// Sets the values for the key, replacing any existing values.
    ///
    /// An existing key keeps its position; a new key goes to the end.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        if let Some(offset) = self.positions.get(&key) {
            self.entries[*offset].1 = values;
        } else {
            self.positions.insert(key.clone(), self.entries.len());
            self.entries.push((key, values));
        }
    }

    /// Appends values to the key, creating the key if it is absent.
    pub fn extend_values(&mut self, key: impl Into<String>, values: impl IntoIterator<Item = String>) {
        let key = key.into();
        if let Some(offset) = self.positions.get(&key) {
            self.entries[*offset].1.extend(values);
        } else {
            self.set(key, values.into_iter().collect());
        }
    }

    /// Removes the key and returns its values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        let offset = self.positions.remove(key)?;
        let (_, values) = self.entries.remove(offset);
        for position in self.positions.values_mut() {
            if *position > offset {
                *position -= 1;
            }
        }
        Some(values)
    }

    /// Iterates over `(key, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Iterates over the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Attributes {}

impl FromIterator<(String, Vec<String>)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        let mut result = Attributes::new();
        for (key, values) in iter {
            result.set(key, values);
        }
        result
    }
}

//-----------------------------------------------------------------------------

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in self.entries.iter() {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

struct AttributesVisitor;

impl<'de> Visitor<'de> for AttributesVisitor {
    type Value = Attributes;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map from strings to lists of strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut result = Attributes::new();
        while let Some((key, values)) = access.next_entry::<String, Vec<String>>()? {
            result.set(key, values);
        }
        Ok(result)
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttributesVisitor)
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order() {
        let mut attrs = Attributes::new();
        attrs.set("ID", vec![String::from("gene1")]);
        attrs.set("Name", vec![String::from("abc")]);
        attrs.set("Alias", vec![String::from("x"), String::from("y")]);

        let keys: Vec<&str> = attrs.keys().collect();
        assert_eq!(keys, vec!["ID", "Name", "Alias"], "Wrong key order");

        // Replacing values keeps the key position.
        attrs.set("Name", vec![String::from("def")]);
        let keys: Vec<&str> = attrs.keys().collect();
        assert_eq!(keys, vec!["ID", "Name", "Alias"], "Replacement changed the key order");
        assert_eq!(attrs.get("Name").unwrap(), ["def"], "Wrong values after replacement");
    }

    #[test]
    fn empty_value_lists() {
        let mut attrs = Attributes::new();
        attrs.set("Complete", Vec::new());
        assert!(attrs.contains_key("Complete"), "Missing key with an empty value list");
        assert!(attrs.get("Complete").unwrap().is_empty(), "Expected no values");
        assert!(attrs.first("Complete").is_none(), "An empty value list has no first value");
    }

    #[test]
    fn removal() {
        let mut attrs = Attributes::new();
        attrs.set("a", vec![String::from("1")]);
        attrs.set("b", vec![String::from("2")]);
        attrs.set("c", vec![String::from("3")]);

        assert_eq!(attrs.remove("b"), Some(vec![String::from("2")]), "Wrong removed values");
        let keys: Vec<&str> = attrs.keys().collect();
        assert_eq!(keys, vec!["a", "c"], "Wrong key order after removal");
        assert_eq!(attrs.first("c"), Some("3"), "Stale position index after removal");
    }

    #[test]
    fn json_round_trip() {
        let mut attrs = Attributes::new();
        attrs.set("Parent", vec![String::from("mRNA1"), String::from("mRNA2")]);
        attrs.set("ID", vec![String::from("exon1")]);
        attrs.set("Complete", Vec::new());

        let serialized = serde_json::to_string(&attrs).unwrap();
        let deserialized: Attributes = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, attrs, "Attributes changed in a JSON round trip");

        let keys: Vec<&str> = deserialized.keys().collect();
        assert_eq!(keys, vec!["Parent", "ID", "Complete"], "Key order lost in a JSON round trip");
    }
}

//-----------------------------------------------------------------------------
