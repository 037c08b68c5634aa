//! Composite cache keys.
//!
//! A [`CacheKey`] is an ordered sequence of string components. Keys can only
//! be built through [`CacheKeyBuilder`], which rejects components containing
//! the separator, so [`CacheKey::encode`] is injective.

use std::fmt;

use vantage_core::{CacheError, View};

/// Separator between encoded key components (ASCII unit separator).
pub const KEY_SEPARATOR: char = '\u{1f}';

/// An ordered, non-empty sequence of key components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Private so keys cannot bypass the builder's separator check.
    components: Vec<String>,
}

impl CacheKey {
    /// Start building a key.
    pub fn builder() -> CacheKeyBuilder {
        CacheKeyBuilder::default()
    }

    /// Single-component key for a resource name.
    pub fn named(name: &str) -> Result<Self, CacheError> {
        Self::builder().component(name).build()
    }

    /// `(name, view)` key for view-aware caches.
    pub fn for_view(name: &str, view: View) -> Result<Self, CacheError> {
        Self::builder().component(name).component(view.as_str()).build()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The first component, the resource name for named keys.
    pub fn head(&self) -> &str {
        // Non-empty by construction.
        &self.components[0]
    }

    /// Serialize to the lookup string.
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                encoded.push(KEY_SEPARATOR);
            }
            encoded.push_str(component);
        }
        encoded
    }

    /// Parse a lookup string produced by [`CacheKey::encode`].
    pub fn decode(encoded: &str) -> Result<Self, CacheError> {
        encoded
            .split(KEY_SEPARATOR)
            .fold(Self::builder(), |builder, part| builder.component(part))
            .build()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join(" "))
    }
}

/// Builder for [`CacheKey`].
#[derive(Debug, Default)]
pub struct CacheKeyBuilder {
    components: Vec<String>,
    error: Option<CacheError>,
}

impl CacheKeyBuilder {
    /// Append a component. The first invalid component is reported by
    /// [`CacheKeyBuilder::build`].
    pub fn component(mut self, component: impl Into<String>) -> Self {
        let component = component.into();
        if self.error.is_none() && component.contains(KEY_SEPARATOR) {
            self.error = Some(CacheError::InvalidKeyComponent {
                component: component.clone(),
                reason: "contains the reserved key separator".to_string(),
            });
        }
        self.components.push(component);
        self
    }

    pub fn build(self) -> Result<CacheKey, CacheError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.components.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        Ok(CacheKey {
            components: self.components,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_named_key() {
        let key = CacheKey::named("projects/acme").unwrap();
        assert_eq!(key.head(), "projects/acme");
        assert_eq!(key.components().len(), 1);
        assert_eq!(key.to_string(), "projects/acme");
    }

    #[test]
    fn test_view_key_distinguishes_views() {
        let basic = CacheKey::for_view("instances/i/databases/d/metadata", View::Basic).unwrap();
        let full = CacheKey::for_view("instances/i/databases/d/metadata", View::Full).unwrap();
        assert_ne!(basic, full);
        assert_eq!(basic.head(), full.head());
    }

    #[test]
    fn test_rejects_separator() {
        let err = CacheKey::builder()
            .component("ok")
            .component(format!("bad{}part", KEY_SEPARATOR))
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidKeyComponent { .. }));
    }

    #[test]
    fn test_rejects_empty_key() {
        assert_eq!(CacheKey::builder().build().unwrap_err(), CacheError::EmptyKey);
    }

    #[test]
    fn test_empty_components_are_distinct() {
        let a = CacheKey::builder().component("a").component("").build().unwrap();
        let b = CacheKey::builder().component("a").build().unwrap();
        assert_ne!(a, b);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_decode_encode() {
        let key = CacheKey::builder()
            .component("instances/i/databases/d/metadata")
            .component("FULL")
            .component("public")
            .build()
            .unwrap();
        assert_eq!(CacheKey::decode(&key.encode()).unwrap(), key);
    }

    fn component() -> impl Strategy<Value = String> {
        "[a-z0-9/_-]{0,8}"
    }

    proptest! {
        #[test]
        fn encode_is_injective(
            a in prop::collection::vec(component(), 1..4),
            b in prop::collection::vec(component(), 1..4),
        ) {
            let ka = a.iter().fold(CacheKey::builder(), |k, c| k.component(c.as_str())).build().unwrap();
            let kb = b.iter().fold(CacheKey::builder(), |k, c| k.component(c.as_str())).build().unwrap();
            prop_assert_eq!(ka == kb, ka.encode() == kb.encode());
        }
    }
}
