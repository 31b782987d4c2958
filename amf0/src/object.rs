use crate::Amf0Value;
use std::iter::FromIterator;
use std::slice;

/// The properties of an AMF0 object (or ECMA array) in the order they were encoded.
///
/// Lookups are linear scans returning the first matching property, which mirrors how the
/// format is read off the wire and keeps duplicate names intact.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Amf0Object {
    properties: Vec<(String, Amf0Value)>,
}

impl Amf0Object {
    pub fn new() -> Amf0Object {
        Amf0Object {
            properties: Vec::new(),
        }
    }

    /// Appends a property to the end of the object
    pub fn insert<N: Into<String>>(&mut self, name: N, value: Amf0Value) {
        self.properties.push((name.into(), value));
    }

    /// Returns the first property with exactly the specified name
    pub fn get(&self, name: &str) -> Option<&Amf0Value> {
        self.properties
            .iter()
            .find(|(property_name, _)| property_name == name)
            .map(|(_, value)| value)
    }

    /// Returns the first property whose name matches without regard to ASCII case
    pub fn get_ignore_case(&self, name: &str) -> Option<&Amf0Value> {
        self.properties
            .iter()
            .find(|(property_name, _)| property_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Case-insensitive recursive search, see `Amf0Value::find_matching`
    pub fn find_matching(&self, name: &str, limit: usize) -> Vec<&Amf0Value> {
        let mut results = Vec::new();
        self.collect_matching(name, limit, &mut results);
        results
    }

    pub(crate) fn collect_matching<'a>(
        &'a self,
        name: &str,
        limit: usize,
        results: &mut Vec<&'a Amf0Value>,
    ) {
        for (property_name, value) in &self.properties {
            if results.len() >= limit {
                return;
            }

            if property_name.eq_ignore_ascii_case(name) {
                results.push(value);
                continue;
            }

            crate::collect_matching(value, name, limit, results);
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<(String, Amf0Value)> {
        self.properties.iter()
    }
}

impl FromIterator<(String, Amf0Value)> for Amf0Object {
    fn from_iter<I: IntoIterator<Item = (String, Amf0Value)>>(iter: I) -> Self {
        Amf0Object {
            properties: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Amf0Object {
    type Item = (String, Amf0Value);
    type IntoIter = std::vec::IntoIter<(String, Amf0Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.into_iter()
    }
}

impl<'a> IntoIterator for &'a Amf0Object {
    type Item = &'a (String, Amf0Value);
    type IntoIter = slice::Iter<'a, (String, Amf0Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter()
    }
}
