//! Small, enum-keyed metadata map shared by [`SQLFragment`](../fhir4ds_fhirpath/struct.SQLFragment.html)
//! and `CTE` records.
//!
//! The Python source carried metadata as a shallow-copied `dict[str, Any]`.
//! The set of keys is fixed and small (see spec §3), so instead of a general
//! dynamic map this uses a closed key enum plus a flat `Vec` of pairs —
//! cheap to clone, cheap to iterate, and every valid key is enumerable at
//! compile time.

use std::fmt;

/// Contractual metadata keys a fragment or CTE may carry (spec §3/§4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    ArrayColumn,
    ResultAlias,
    IdColumn,
    ProjectionExpression,
    SourcePath,
    UnnestLevel,
    Function,
    ResultType,
    VariantProperty,
    DiscriminatorFields,
    IsCollection,
    Mode,
    Optimized,
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataKey::ArrayColumn => "array_column",
            MetadataKey::ResultAlias => "result_alias",
            MetadataKey::IdColumn => "id_column",
            MetadataKey::ProjectionExpression => "projection_expression",
            MetadataKey::SourcePath => "source_path",
            MetadataKey::UnnestLevel => "unnest_level",
            MetadataKey::Function => "function",
            MetadataKey::ResultType => "result_type",
            MetadataKey::VariantProperty => "variant_property",
            MetadataKey::DiscriminatorFields => "discriminator_fields",
            MetadataKey::IsCollection => "is_collection",
            MetadataKey::Mode => "mode",
            MetadataKey::Optimized => "optimized",
        };
        f.write_str(name)
    }
}

/// A metadata value. Most keys carry text; a few carry a count, a flag, or a
/// short list of field names (`discriminator_fields`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Number(i64),
    Bool(bool),
    List(Vec<String>),
}

impl MetadataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetadataValue::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::List(value)
    }
}

/// Insertion-ordered, shallow-copyable metadata map keyed by [`MetadataKey`].
///
/// `Metadata` is deliberately not a `HashMap`: the key set is small and
/// fixed, so a flat `Vec` is both cheaper to clone (fragments are cloned
/// often while threading through the translator) and keeps iteration order
/// stable, which makes golden-SQL tests deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(MetadataKey, MetadataValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn insert(&mut self, key: MetadataKey, value: impl Into<MetadataValue>) -> &mut Self {
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
        self
    }

    pub fn with(mut self, key: MetadataKey, value: impl Into<MetadataValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: MetadataKey) -> Option<&MetadataValue> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: MetadataKey) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: MetadataKey) -> Option<MetadataValue> {
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            Some(self.entries.remove(pos).1)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(MetadataKey, MetadataValue)> {
        self.entries.iter()
    }

    /// Merge `other` into `self`, keys in `other` taking precedence. Used
    /// when a CTE shallow-copies metadata from its source fragment.
    pub fn merge_from(&mut self, other: &Metadata) {
        for (key, value) in other.iter() {
            self.insert(*key, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_existing_key() {
        let mut meta = Metadata::new();
        meta.insert(MetadataKey::ArrayColumn, "name_item");
        meta.insert(MetadataKey::ArrayColumn, "given_item");
        assert_eq!(
            meta.get(MetadataKey::ArrayColumn).and_then(|v| v.as_text()),
            Some("given_item")
        );
    }

    #[test]
    fn shallow_copy_preserves_values_independently() {
        let mut source = Metadata::new();
        source.insert(MetadataKey::ResultAlias, "given_item");
        let mut copy = source.clone();
        copy.insert(MetadataKey::ResultAlias, "other");
        assert_eq!(
            source.get(MetadataKey::ResultAlias).and_then(|v| v.as_text()),
            Some("given_item")
        );
        assert_eq!(
            copy.get(MetadataKey::ResultAlias).and_then(|v| v.as_text()),
            Some("other")
        );
    }

    #[test]
    fn merge_from_overwrites_and_preserves_order() {
        let mut a = Metadata::new();
        a.insert(MetadataKey::ArrayColumn, "x");
        a.insert(MetadataKey::ResultAlias, "y");
        let mut b = Metadata::new();
        b.insert(MetadataKey::ResultAlias, "z");
        a.merge_from(&b);
        assert_eq!(a.get(MetadataKey::ArrayColumn).and_then(|v| v.as_text()), Some("x"));
        assert_eq!(a.get(MetadataKey::ResultAlias).and_then(|v| v.as_text()), Some("z"));
    }
}
