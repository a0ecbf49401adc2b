//! Name filters for the layer and driver enable/disable environment
//! variables.
//!
//! The pattern language is deliberately not a glob implementation:
//! `*foo*` matches any name containing `foo`, `foo*` a prefix, `*foo` a
//! suffix, and anything else matches exactly. A few reserved tokens select
//! whole classes of layers.

use crate::env;

/// Tokens that match every layer.
const TOKENS_ALL: &[&str] = &["*", "**", "~all~"];
/// Token that matches implicit layers only.
const TOKEN_IMPLICIT: &str = "~implicit~";
/// Token that matches explicit layers only.
const TOKEN_EXPLICIT: &str = "~explicit~";

/// Matches `name` against one pattern using the four string operations.
pub fn pattern_match(pattern: &str, name: &str) -> bool {
    let starts = pattern.starts_with('*');
    let ends = pattern.len() > 1 && pattern.ends_with('*');
    match (starts, ends) {
        (true, true) => name.contains(&pattern[1..pattern.len() - 1]),
        (true, false) => name.ends_with(&pattern[1..]),
        (false, true) => name.starts_with(&pattern[..pattern.len() - 1]),
        (false, false) => name == pattern,
    }
}

/// A parsed comma-separated filter variable.
#[derive(Debug, Default, Clone)]
pub struct FilterList {
    patterns: Vec<String>,
}

impl FilterList {
    pub fn parse(value: &str) -> FilterList {
        FilterList {
            patterns: value
                .split(',')
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(|t| t.to_owned())
                .collect(),
        }
    }

    pub fn from_env(var: &str) -> FilterList {
        env::env_var(var).map(|v| FilterList::parse(&v)).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether any pattern or reserved token claims this layer.
    pub fn matches(&self, name: &str, implicit: bool) -> bool {
        self.patterns.iter().any(|p| {
            if TOKENS_ALL.contains(&p.as_str()) {
                true
            } else if p == TOKEN_IMPLICIT {
                implicit
            } else if p == TOKEN_EXPLICIT {
                !implicit
            } else {
                pattern_match(p, name)
            }
        })
    }

    /// Driver-file variant: no layer-type tokens, just name patterns.
    pub fn matches_name(&self, name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| TOKENS_ALL.contains(&p.as_str()) || pattern_match(p, name))
    }
}

/// The three layer filter variables combined into one decision.
pub struct LayerFilters {
    pub enable: FilterList,
    pub disable: FilterList,
    pub allow: FilterList,
}

impl LayerFilters {
    pub fn from_env() -> LayerFilters {
        LayerFilters {
            enable: FilterList::from_env(env::VK_LAYERS_ENABLE_ENV_VAR),
            disable: FilterList::from_env(env::VK_LAYERS_DISABLE_ENV_VAR),
            allow: FilterList::from_env(env::VK_LAYERS_ALLOW_ENV_VAR),
        }
    }

    /// Whether the disable filter removes the layer: allow overrides disable,
    /// and enable overrides both.
    pub fn is_disabled(&self, name: &str, implicit: bool) -> bool {
        if self.enable.matches(name, implicit) || self.allow.matches(name, implicit) {
            return false;
        }
        self.disable.matches(name, implicit)
    }

    pub fn is_force_enabled(&self, name: &str, implicit: bool) -> bool {
        self.enable.matches(name, implicit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_pattern_shapes() {
        assert!(pattern_match("*foo*", "a_foo_b"));
        assert!(pattern_match("*foo", "a_foo"));
        assert!(!pattern_match("*foo", "foo_b"));
        assert!(pattern_match("foo*", "foo_b"));
        assert!(!pattern_match("foo*", "a_foo"));
        assert!(pattern_match("foo", "foo"));
        assert!(!pattern_match("foo", "afoo"));
    }

    #[test]
    fn reserved_tokens() {
        let f = FilterList::parse("~implicit~");
        assert!(f.matches("VK_LAYER_any", true));
        assert!(!f.matches("VK_LAYER_any", false));
        let f = FilterList::parse("~explicit~");
        assert!(!f.matches("VK_LAYER_any", true));
        assert!(f.matches("VK_LAYER_any", false));
        for all in ["*", "**", "~all~"] {
            assert!(FilterList::parse(all).matches("anything", false));
        }
    }

    #[test]
    fn allow_overrides_disable_enable_overrides_all() {
        let filters = LayerFilters {
            enable: FilterList::parse("VK_LAYER_keep"),
            disable: FilterList::parse("~all~"),
            allow: FilterList::parse("*_spare"),
        };
        assert!(filters.is_disabled("VK_LAYER_other", false));
        assert!(!filters.is_disabled("VK_LAYER_spare", false));
        assert!(!filters.is_disabled("VK_LAYER_keep", false));
        assert!(filters.is_force_enabled("VK_LAYER_keep", false));
    }
}
