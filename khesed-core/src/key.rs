//! Cache key and tag construction.
//!
//! Keys are plain strings to the cache. This module only gives callers one
//! consistent way to build them: `namespace[_tenant][_part...]`, joined with
//! an underscore and never hashed or normalized.

use std::fmt;

/// Separator between key segments.
pub const SEPARATOR: char = '_';

/// Tag prefix shared by every entry that belongs to one church.
pub const CHURCH_TAG_PREFIX: &str = "church";

/// Builder for a namespaced cache key.
///
/// ```
/// use khesed_core::CacheKey;
///
/// let key = CacheKey::new("search").tenant("c1").part("mary").part("{}").part(10);
/// assert_eq!(key.to_string(), "search_c1_mary_{}_10");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    tenant: Option<String>,
    parts: Vec<String>,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            tenant: None,
            parts: Vec::new(),
        }
    }

    /// Scope the key to a tenant (church). The tenant always renders right
    /// after the namespace regardless of call order.
    pub fn tenant(mut self, tenant_id: impl fmt::Display) -> Self {
        self.tenant = Some(tenant_id.to_string());
        self
    }

    pub fn part(mut self, part: impl fmt::Display) -> Self {
        self.parts.push(part.to_string());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    /// Key for a tenant-wide search: `search_{tenant}_{query}_{filters}_{limit}`.
    pub fn search(tenant_id: &str, query: &str, filters_json: &str, limit: usize) -> Self {
        Self::new("search")
            .tenant(tenant_id)
            .part(query)
            .part(filters_json)
            .part(limit)
    }

    /// Render the key string.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace)?;
        if let Some(tenant) = &self.tenant {
            write!(f, "{SEPARATOR}{tenant}")?;
        }
        for part in &self.parts {
            write!(f, "{SEPARATOR}{part}")?;
        }
        Ok(())
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

/// Tag carried by every entry belonging to a church: `church_{id}`.
pub fn church_tag(church_id: impl fmt::Display) -> String {
    format!("{CHURCH_TAG_PREFIX}{SEPARATOR}{church_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_only() {
        assert_eq!(CacheKey::new("stats").to_string(), "stats");
    }

    #[test]
    fn test_tenant_renders_after_namespace() {
        let key = CacheKey::new("members_summary").part("page1").tenant("c9");
        assert_eq!(key.to_string(), "members_summary_c9_page1");
        assert_eq!(key.tenant_id(), Some("c9"));
        assert_eq!(key.namespace(), "members_summary");
    }

    #[test]
    fn test_search_key_shape() {
        let key = CacheKey::search("c1", "mary", "{}", 10);
        assert_eq!(key.render(), "search_c1_mary_{}_10");
    }

    #[test]
    fn test_empty_query_keeps_segment() {
        let key = CacheKey::search("c1", "", "{}", 10);
        assert_eq!(key.render(), "search_c1__{}_10");
    }

    #[test]
    fn test_into_string() {
        let s: String = CacheKey::new("enhanced_analytics").tenant("c1").into();
        assert_eq!(s, "enhanced_analytics_c1");
    }

    #[test]
    fn test_church_tag() {
        assert_eq!(church_tag("c1"), "church_c1");
        assert_eq!(church_tag(42), "church_42");
    }

    #[test]
    fn test_different_tenants_different_keys() {
        let a = CacheKey::search("c1", "mary", "{}", 10);
        let b = CacheKey::search("c2", "mary", "{}", 10);
        assert_ne!(a.render(), b.render());
    }
}
