use std::fmt;

use serde::{Deserialize, Serialize};

/// Capitalization rule applied to titles in a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamespaceCase {
    #[default]
    FirstLetter,
    CaseSensitive,
}

impl NamespaceCase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstLetter => "first-letter",
            Self::CaseSensitive => "case-sensitive",
        }
    }
}

/// Read-only view of the wiki's namespace, special page and magic word tables.
///
/// Implementations must be effectively immutable while titles are being
/// normalized against them; every method is a pure lookup.
pub trait SiteConfig: fmt::Debug + Send + Sync {
    /// Resolve a localized name, canonical name or alias to a namespace id.
    /// Lookup ignores case and treats spaces and underscores alike.
    fn namespace_id(&self, name: &str) -> Option<i32>;

    /// Display name (with spaces) for a namespace id; `""` for the main namespace.
    fn namespace_name(&self, id: i32) -> Option<String>;

    /// Id of a namespace by its canonical lowercase key (`""`, `talk`,
    /// `special`, `user`, `user_talk`, ...).
    fn canonical_namespace_id(&self, canonical: &str) -> Option<i32>;

    fn namespace_case(&self, id: i32) -> NamespaceCase;

    fn namespace_has_subpages(&self, id: i32) -> bool;

    /// Character-class body listing the bytes allowed in a title.
    fn legal_title_chars(&self) -> &str;

    /// Uppercase the first character using full Unicode case mapping.
    fn ucfirst(&self, text: &str) -> String {
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    fn canonical_special_page_name(&self, alias: &str) -> Option<String>;

    /// Canonical magic word for a wikitext keyword; unknown words come back unchanged.
    fn magic_word_canonical_name(&self, word: &str) -> String;
}

/// Namespace lookup key: lowercase with underscores.
pub fn normalize_namespace_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}
