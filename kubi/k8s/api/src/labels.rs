use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

pub type Map = BTreeMap<String, String>;

/// An equality-based label selector, as carried by a Service's `spec.selector`
/// or a NetworkPolicy's `podSelector.matchLabels`.
///
/// Unlike the API server's semantics, an empty selector selects nothing:
/// a Service without a selector is not backed by every pod in its namespace.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Selector(Map);

// === impl Selector ===

impl Selector {
    /// The rendering used for a selector with no keys.
    pub const NONE: &'static str = "(none)";

    pub fn from_map(map: Map) -> Self {
        Self(map)
    }

    /// Reads an optional selector map, treating an absent map as empty.
    pub fn from_optional(map: Option<&Map>) -> Self {
        map.cloned().map(Self).unwrap_or_default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true iff every selector key is present in `labels` with an equal value.
    pub fn matches(&self, labels: &Map) -> bool {
        if self.0.is_empty() {
            return false;
        }

        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

impl AsRef<Map> for Selector {
    #[inline]
    fn as_ref(&self) -> &Map {
        &self.0
    }
}

/// Renders as `key=value` pairs joined by commas, sorted as rendered strings rather than by key;
/// empty selectors render as the empty string.
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();
        pairs.sort_unstable();
        f.write_str(&pairs.join(","))
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}
