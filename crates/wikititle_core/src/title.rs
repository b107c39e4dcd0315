use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use regex::bytes::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use crate::error::TitleError;
use crate::ip::sanitize_ip;
use crate::site::{NamespaceCase, SiteConfig};

pub const MAX_TITLE_BYTES: usize = 255;
pub const MAX_SPECIAL_TITLE_BYTES: usize = 512;

const REPLACEMENT_CHARACTER: char = '\u{FFFD}';

static ILLEGAL_CHARS_CACHE: OnceLock<RwLock<HashMap<String, Arc<Regex>>>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Title {
    namespace_id: i32,
    namespace_name: String,
    key: String,
    fragment: Option<String>,
}

impl Title {
    /// Wrap an already validated database key. No normalization is applied.
    pub fn new(
        key: impl Into<String>,
        namespace_id: i32,
        site: &dyn SiteConfig,
        fragment: Option<String>,
    ) -> Self {
        let namespace_name = site.namespace_name(namespace_id).unwrap_or_else(|| {
            warn!(namespace = namespace_id, "title in unknown namespace");
            String::new()
        });
        Self {
            namespace_id,
            namespace_name,
            key: key.into(),
            fragment,
        }
    }

    /// Normalize raw bytes, rejecting anything that is not UTF-8.
    pub fn new_from_bytes(
        bytes: &[u8],
        site: &dyn SiteConfig,
        default_ns: i32,
    ) -> Result<Self, TitleError> {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::new_from_text(text, site, default_ns),
            Err(_) => Err(reject(TitleError::InvalidEncoding {
                title: String::from_utf8_lossy(bytes).into_owned(),
            })),
        }
    }

    /// Normalize link or user text into a title.
    ///
    /// `default_ns` applies when the text carries no recognized namespace
    /// prefix. A leading `:` resets it to the main namespace.
    pub fn new_from_text(
        text: &str,
        site: &dyn SiteConfig,
        default_ns: i32,
    ) -> Result<Self, TitleError> {
        let original = text;
        let fail = |error: fn(String) -> TitleError| -> Result<Title, TitleError> {
            Err(reject(error(original.to_string())))
        };

        let mut title = canonicalize_whitespace(text);
        if title.contains(REPLACEMENT_CHARACTER) {
            return fail(|title| TitleError::InvalidEncoding { title });
        }

        let mut default_ns = default_ns;
        if let Some(rest) = title.strip_prefix(':') {
            title = rest.trim_start_matches('_').to_string();
            default_ns = 0;
        }
        if title.is_empty() {
            return fail(|title| TitleError::EmptyTitle { title });
        }

        let prefixed = split_namespace_prefix(&title).and_then(|(prefix, rest)| {
            site.namespace_id(prefix).map(|id| (id, rest.to_string()))
        });
        let (ns, mut title) = match prefixed {
            Some(found) => found,
            None => (default_ns, title),
        };
        trace!(namespace = ns, title = %title, "resolved namespace prefix");

        // Talk pages of other namespaces have their own ids; "Talk:File:X" is not one.
        if is_canonical(site, ns, "talk")
            && split_namespace_prefix(&title)
                .is_some_and(|(prefix, _)| site.namespace_id(prefix).is_some())
        {
            return fail(|title| TitleError::InvalidTalkNamespace { title });
        }

        let mut fragment = None;
        if let Some(index) = title.find('#') {
            fragment = Some(title[index + 1..].to_string());
            title.truncate(index);
            let trimmed = title.trim_end_matches('_').len();
            title.truncate(trimmed);
        }

        if contains_illegal_chars(&title, site.legal_title_chars()) {
            return fail(|title| TitleError::InvalidCharacters { title });
        }
        if has_relative_path_segment(&title) {
            return fail(|title| TitleError::InvalidRelativePath { title });
        }
        if title.contains("~~~") {
            return fail(|title| TitleError::InvalidMagicTilde { title });
        }

        let max_length = if is_canonical(site, ns, "special") {
            MAX_SPECIAL_TITLE_BYTES
        } else {
            MAX_TITLE_BYTES
        };
        if title.len() > max_length {
            return fail(|title| TitleError::TitleTooLong { title });
        }

        if site.namespace_case(ns) == NamespaceCase::FirstLetter {
            title = site.ucfirst(&title);
        }

        // A bare "#fragment" is a link into the current page.
        if title.is_empty() && !is_canonical(site, ns, "") {
            return fail(|title| TitleError::EmptyTitle { title });
        }

        if is_canonical(site, ns, "user") || is_canonical(site, ns, "user_talk") {
            title = sanitize_ip(&title);
        }

        if is_canonical(site, ns, "special") {
            let (page, subpage) = match title.split_once('/') {
                Some((page, subpage)) => (page, Some(subpage)),
                None => (title.as_str(), None),
            };
            if let Some(name) = site.canonical_special_page_name(page) {
                title = match subpage {
                    Some(subpage) => format!("{name}/{subpage}"),
                    None => name,
                };
            }
        }

        trace!(namespace = ns, key = %title, "normalized title");
        Ok(Self::new(title, ns, site, fragment))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn namespace_id(&self) -> i32 {
        self.namespace_id
    }

    pub fn namespace_name(&self) -> &str {
        &self.namespace_name
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// `Namespace_name:Key`, or just the key in the main namespace.
    pub fn prefixed_db_key(&self) -> String {
        if self.namespace_name.is_empty() {
            return self.key.clone();
        }
        format!("{}:{}", self.namespace_name.replace(' ', "_"), self.key)
    }

    /// `Namespace name:Key with spaces`, the human readable form.
    pub fn prefixed_text(&self) -> String {
        let text = self.key.replace('_', " ");
        if self.namespace_name.is_empty() {
            return text;
        }
        format!("{}:{text}", self.namespace_name)
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefixed_text())?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

fn reject(error: TitleError) -> TitleError {
    debug!(code = error.code(), title = %error.title(), "rejected title");
    error
}

fn is_canonical(site: &dyn SiteConfig, ns: i32, canonical: &str) -> bool {
    site.canonical_namespace_id(canonical) == Some(ns)
}

fn is_bidi_mark(ch: char) -> bool {
    matches!(ch, '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}')
}

fn is_title_space(ch: char) -> bool {
    matches!(
        ch,
        ' ' | '_'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{180E}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
    )
}

/// Drop bidi marks, fold every space-like run into one `_` and trim `_` from both ends.
fn canonicalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars().filter(|&ch| !is_bidi_mark(ch)) {
        if is_title_space(ch) {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// Split `Prefix_:_rest` at the first colon that follows a non-empty prefix.
///
/// Underscores on either side of the colon belong to neither part. Text with
/// a line feed anywhere but at the very end never splits, and a final line
/// feed is left off the remainder.
fn split_namespace_prefix(text: &str) -> Option<(&str, &str)> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    if body.contains('\n') {
        return None;
    }
    let bytes = body.as_bytes();
    let mut start = 1;
    while start < bytes.len() {
        let mut colon = start;
        while colon < bytes.len() && bytes[colon] == b'_' {
            colon += 1;
        }
        if bytes.get(colon) == Some(&b':') {
            let mut rest = colon + 1;
            while rest < bytes.len() && bytes[rest] == b'_' {
                rest += 1;
            }
            return Some((&body[..start], &body[rest..]));
        }
        start = colon + 1;
    }
    None
}

/// Compile (once per character set) the byte-level matcher for characters
/// and sequences that may not appear in a title.
pub fn illegal_chars_matcher(legal_title_chars: &str) -> Result<Arc<Regex>, regex::Error> {
    let cache = ILLEGAL_CHARS_CACHE.get_or_init(|| RwLock::new(HashMap::new()));
    {
        let guard = cache.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(matcher) = guard.get(legal_title_chars) {
            return Ok(Arc::clone(matcher));
        }
    }
    let pattern = format!(
        "[^{legal_title_chars}]|%[0-9A-Fa-f]{{2}}|&[A-Za-z0-9\\x80-\\xff]+;|&#[0-9]+;|&#x[0-9A-Fa-f]+;"
    );
    let matcher = Arc::new(RegexBuilder::new(&pattern).unicode(false).build()?);
    let mut guard = cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    Ok(Arc::clone(
        guard
            .entry(legal_title_chars.to_string())
            .or_insert(matcher),
    ))
}

/// Percent escapes and character references cannot round-trip through links,
/// so they are rejected along with bytes outside the legal set.
fn contains_illegal_chars(title: &str, legal_title_chars: &str) -> bool {
    match illegal_chars_matcher(legal_title_chars) {
        Ok(matcher) => matcher.is_match(title.as_bytes()),
        Err(err) => {
            error!(legal_title_chars, error = %err, "legal title character set does not compile");
            true
        }
    }
}

fn has_relative_path_segment(title: &str) -> bool {
    title.contains('.')
        && (title == "."
            || title == ".."
            || title.starts_with("./")
            || title.starts_with("../")
            || title.contains("/./")
            || title.contains("/../")
            || title.ends_with("/.")
            || title.ends_with("/.."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomNamespace, DEFAULT_LEGAL_TITLE_CHARS, StaticSiteConfig, WikiConfig};

    fn site() -> StaticSiteConfig {
        StaticSiteConfig::with_project_name("Wikipedia")
    }

    fn normalize(text: &str) -> Result<Title, TitleError> {
        Title::new_from_text(text, &site(), 0)
    }

    fn key_of(text: &str) -> String {
        normalize(text).expect("valid title").key().to_string()
    }

    fn code_of(text: &str) -> &'static str {
        normalize(text).expect_err("must fail").code()
    }

    #[test]
    fn plain_title_is_capitalized_and_underscored() {
        let title = normalize("foo bar").expect("title");
        assert_eq!(title.namespace_id(), 0);
        assert_eq!(title.namespace_name(), "");
        assert_eq!(title.key(), "Foo_bar");
        assert_eq!(title.prefixed_text(), "Foo bar");
        assert_eq!(title.prefixed_db_key(), "Foo_bar");
        assert_eq!(title.fragment(), None);
    }

    #[test]
    fn whitespace_runs_collapse_to_one_underscore() {
        assert_eq!(key_of("  a \u{00A0}_\u{3000} b__c  "), "A_b_c");
        assert_eq!(key_of("x\u{2003}\u{2009}y"), "X_y");
        assert_eq!(key_of("___Trimmed___"), "Trimmed");
    }

    #[test]
    fn bidi_marks_are_removed() {
        assert_eq!(key_of("\u{200E}Foo\u{202B}bar\u{200F}"), "Foobar");
        assert_eq!(key_of("a \u{202A} b"), "A_b");
    }

    #[test]
    fn replacement_character_is_an_encoding_error() {
        assert_eq!(code_of("Foo\u{FFFD}"), "title-invalid-utf8");
    }

    #[test]
    fn invalid_utf8_bytes_are_rejected() {
        let error = Title::new_from_bytes(b"Foo\xFF", &site(), 0).expect_err("must fail");
        assert_eq!(error.code(), "title-invalid-utf8");
        let title = Title::new_from_bytes("Bär".as_bytes(), &site(), 0).expect("title");
        assert_eq!(title.key(), "Bär");
    }

    #[test]
    fn empty_titles_are_rejected() {
        assert_eq!(code_of(""), "title-invalid-empty");
        assert_eq!(code_of(" _ \u{00A0}"), "title-invalid-empty");
        assert_eq!(code_of(":"), "title-invalid-empty");
        assert_eq!(code_of("User:"), "title-invalid-empty");
        assert_eq!(code_of("Talk:#frag"), "title-invalid-empty");
    }

    #[test]
    fn bare_fragment_is_a_main_namespace_title() {
        let title = normalize("#Section one").expect("title");
        assert_eq!(title.namespace_id(), 0);
        assert_eq!(title.key(), "");
        assert_eq!(title.fragment(), Some("Section_one"));
    }

    #[test]
    fn leading_colon_forces_main_namespace() {
        let title = Title::new_from_text(":Foo", &site(), 10).expect("title");
        assert_eq!(title.namespace_id(), 0);
        assert_eq!(title.key(), "Foo");

        let title = Title::new_from_text(":_ bar", &site(), 10).expect("title");
        assert_eq!(title.key(), "Bar");
    }

    #[test]
    fn leading_colon_still_honors_namespace_prefix() {
        let title = Title::new_from_text(":Wikipedia:Foo", &site(), 10).expect("title");
        assert_eq!(title.namespace_id(), 4);
        assert_eq!(title.key(), "Foo");
    }

    #[test]
    fn default_namespace_applies_without_prefix() {
        let title = Title::new_from_text("Infobox", &site(), 10).expect("title");
        assert_eq!(title.namespace_id(), 10);
        assert_eq!(title.prefixed_db_key(), "Template:Infobox");
    }

    #[test]
    fn namespace_prefix_is_case_insensitive_and_padded() {
        let title = normalize("user talk : Example").expect("title");
        assert_eq!(title.namespace_id(), 3);
        assert_eq!(title.key(), "Example");
        assert_eq!(title.prefixed_db_key(), "User_talk:Example");
        assert_eq!(title.prefixed_text(), "User talk:Example");

        let title = normalize("image:Foo.png").expect("title");
        assert_eq!(title.namespace_id(), 6);
        assert_eq!(title.prefixed_text(), "File:Foo.png");
    }

    #[test]
    fn unknown_prefix_stays_in_title() {
        let title = normalize("Foo:Bar").expect("title");
        assert_eq!(title.namespace_id(), 0);
        assert_eq!(title.key(), "Foo:Bar");
    }

    #[test]
    fn only_first_prefix_is_peeled() {
        let title = normalize("Help:User:Foo").expect("title");
        assert_eq!(title.namespace_id(), 12);
        assert_eq!(title.key(), "User:Foo");
    }

    #[test]
    fn split_namespace_prefix_takes_shortest_prefix() {
        assert_eq!(split_namespace_prefix("A__:__B"), Some(("A", "B")));
        assert_eq!(split_namespace_prefix("A:B:C"), Some(("A", "B:C")));
        assert_eq!(split_namespace_prefix("A_b:c"), Some(("A_b", "c")));
        assert_eq!(split_namespace_prefix("A:"), Some(("A", "")));
        assert_eq!(split_namespace_prefix("Abc"), None);
        assert_eq!(split_namespace_prefix(":Abc"), None);
        assert_eq!(split_namespace_prefix("A:b\n"), Some(("A", "b")));
        assert_eq!(split_namespace_prefix("A:b\nc"), None);
    }

    #[test]
    fn talk_titles_cannot_embed_namespace() {
        assert_eq!(code_of("Talk:File:X"), "title-invalid-talk-namespace");
        assert_eq!(code_of("Talk: user : X"), "title-invalid-talk-namespace");
        let title = normalize("Talk:Foo:X").expect("title");
        assert_eq!(title.namespace_id(), 1);
        assert_eq!(title.key(), "Foo:X");
        let title = normalize("User talk:File:X").expect("title");
        assert_eq!(title.key(), "File:X");
    }

    #[test]
    fn fragment_is_split_at_first_hash() {
        let title = normalize("Foo bar _#Baz#Qux").expect("title");
        assert_eq!(title.key(), "Foo_bar");
        assert_eq!(title.fragment(), Some("Baz#Qux"));
        assert_eq!(title.to_string(), "Foo bar#Baz#Qux");

        let title = normalize("Foo#").expect("title");
        assert_eq!(title.fragment(), Some(""));
    }

    #[test]
    fn fragment_may_hold_otherwise_illegal_characters() {
        let title = normalize("Foo#a<b>%41").expect("title");
        assert_eq!(title.fragment(), Some("a<b>%41"));
    }

    #[test]
    fn illegal_characters_are_rejected() {
        for text in ["A<b", "A>b", "A[b]", "A{b}", "A|b", "A\tb", "A\nb", "A\u{7F}"] {
            assert_eq!(code_of(text), "title-invalid-characters", "text={text:?}");
        }
    }

    #[test]
    fn percent_escapes_and_entities_are_rejected() {
        for text in ["A%20b", "A%zz%2f", "A&amp;b", "Caf&eacute;", "X&\u{e9};"] {
            assert_eq!(code_of(text), "title-invalid-characters", "text={text:?}");
        }
        assert_eq!(key_of("100%"), "100%");
        assert_eq!(key_of("Tom & Jerry"), "Tom_&_Jerry");
    }

    #[test]
    fn numeric_references_split_at_hash_first() {
        let title = normalize("A&#123;").expect("title");
        assert_eq!(title.key(), "A&");
        assert_eq!(title.fragment(), Some("123;"));

        let title = normalize("A&#x1F;").expect("title");
        assert_eq!(title.key(), "A&");
        assert_eq!(title.fragment(), Some("x1F;"));
    }

    #[test]
    fn matcher_flags_numeric_references() {
        let matcher = illegal_chars_matcher(DEFAULT_LEGAL_TITLE_CHARS).expect("matcher");
        assert!(matcher.is_match(b"A&#123;"));
        assert!(matcher.is_match(b"A&#x1F;"));
        assert!(matcher.is_match(b"A&amp;"));
        assert!(!matcher.is_match("Ωμέγα & co".as_bytes()));
    }

    #[test]
    fn matcher_is_shared_across_threads() {
        let first = illegal_chars_matcher(DEFAULT_LEGAL_TITLE_CHARS).expect("matcher");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    let site = StaticSiteConfig::default();
                    (0..50).all(|n| {
                        Title::new_from_text(&format!("Page {n}"), &site, 0).is_ok()
                    })
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("worker"));
        }
        let second = illegal_chars_matcher(DEFAULT_LEGAL_TITLE_CHARS).expect("matcher");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn non_ascii_text_is_legal() {
        assert_eq!(key_of("Ελληνικά"), "Ελληνικά");
        assert_eq!(key_of("日本語"), "日本語");
    }

    #[test]
    fn relative_path_segments_are_rejected() {
        for text in ["a/./b", "..", ".", "foo/..", "foo/.", "./x", "../x", "a/../b"] {
            assert_eq!(code_of(text), "title-invalid-relative", "text={text:?}");
        }
        assert_eq!(key_of("a.b/..c"), "A.b/..c");
        assert_eq!(key_of("...."), "....");
    }

    #[test]
    fn magic_tilde_is_rejected() {
        assert_eq!(code_of("Foo~~~bar"), "title-invalid-magic-tilde");
        assert_eq!(key_of("Foo~~bar"), "Foo~~bar");
    }

    #[test]
    fn length_limit_depends_on_namespace() {
        let long = "a".repeat(MAX_TITLE_BYTES);
        assert_eq!(key_of(&long).len(), MAX_TITLE_BYTES);
        assert_eq!(code_of(&format!("{long}a")), "title-invalid-too-long");

        let special = normalize(&format!("Special:{long}a")).expect("special title");
        assert_eq!(special.namespace_id(), -1);
        let special_max = "a".repeat(MAX_SPECIAL_TITLE_BYTES);
        assert!(normalize(&format!("Special:{special_max}")).is_ok());
        assert_eq!(
            code_of(&format!("Special:{special_max}a")),
            "title-invalid-too-long"
        );
    }

    #[test]
    fn length_counts_bytes_not_characters() {
        let wide = "é".repeat(128);
        assert_eq!(code_of(&wide), "title-invalid-too-long");
    }

    #[test]
    fn case_sensitive_namespace_keeps_first_letter() {
        let mut config = WikiConfig::default();
        config.site.custom_namespaces.push(CustomNamespace {
            name: "Lore".to_string(),
            id: 3000,
            aliases: Vec::new(),
            case: NamespaceCase::CaseSensitive,
            subpages: false,
        });
        let site = StaticSiteConfig::from_config(&config).expect("site config");
        let title = Title::new_from_text("lore:iPhone", &site, 0).expect("title");
        assert_eq!(title.namespace_id(), 3000);
        assert_eq!(title.key(), "iPhone");
        assert_eq!(title.prefixed_db_key(), "Lore:iPhone");
    }

    #[test]
    fn first_letter_uses_unicode_uppercase() {
        assert_eq!(key_of("éclair"), "Éclair");
        assert_eq!(key_of("ǆungla"), "Ǆungla");
    }

    #[test]
    fn user_namespace_ip_addresses_are_canonicalized() {
        let title = normalize("User:001.002.003.004").expect("title");
        assert_eq!(title.namespace_id(), 2);
        assert_eq!(title.key(), "1.2.3.4");

        assert_eq!(key_of("User:::1"), "0:0:0:0:0:0:0:1");
        assert_eq!(key_of("User talk:fe80::1"), "FE80:0:0:0:0:0:0:1");
        assert_eq!(key_of("User:0:0:0:0:0:0:0:1"), "0:0:0:0:0:0:0:1");
        assert_eq!(key_of("User:Example"), "Example");
    }

    #[test]
    fn ip_canonicalization_is_limited_to_user_namespaces() {
        assert_eq!(key_of("001.002.003.004"), "001.002.003.004");
        assert_eq!(key_of("Help:001.002.003.004"), "001.002.003.004");
    }

    #[test]
    fn special_page_names_are_canonicalized() {
        let title = normalize("Special:recentchanges").expect("title");
        assert_eq!(title.key(), "RecentChanges");
        assert_eq!(key_of("Special:Recent changes/50"), "RecentChanges/50");
        assert_eq!(key_of("special:random/a/b"), "Randompage/a/b");
        assert_eq!(key_of("Special:Nonexistent/x"), "Nonexistent/x");
    }

    #[test]
    fn errors_carry_original_text() {
        let error = normalize(" Foo~~~ ").expect_err("must fail");
        assert_eq!(error.title(), " Foo~~~ ");
    }

    #[test]
    fn direct_construction_skips_normalization() {
        let title = Title::new("Foo_bar", 10, &site(), Some("Usage".to_string()));
        assert_eq!(title.prefixed_db_key(), "Template:Foo_bar");
        assert_eq!(title.prefixed_text(), "Template:Foo bar");
        assert_eq!(title.to_string(), "Template:Foo bar#Usage");

        let unknown = Title::new("X", 4242, &site(), None);
        assert_eq!(unknown.namespace_name(), "");
        assert_eq!(unknown.prefixed_db_key(), "X");
    }

    #[test]
    fn title_serializes_to_json() {
        let title = normalize("Wikipedia talk:Village pump#Top").expect("title");
        let value = serde_json::to_value(&title).expect("serialize");
        assert_eq!(value["namespace_id"], 5);
        assert_eq!(value["namespace_name"], "Wikipedia talk");
        assert_eq!(value["key"], "Village_pump");
        assert_eq!(value["fragment"], "Top");
    }

    #[test]
    fn custom_legal_chars_are_honored() {
        let mut config = WikiConfig::default();
        config.site.legal_title_chars = Some("A-Za-z0-9_:".to_string());
        let site = StaticSiteConfig::from_config(&config).expect("site config");
        assert!(Title::new_from_text("Foo_bar", &site, 0).is_ok());
        let error = Title::new_from_text("Foo-bar", &site, 0).expect_err("must fail");
        assert_eq!(error.code(), "title-invalid-characters");
    }
}
