use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::TitleError;
use crate::ip::trim_blanks;
use crate::site::SiteConfig;
use crate::title::Title;

/// The page a document belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PageConfig {
    /// Prefixed title, e.g. `Wikipedia:Foo/bar`.
    pub title: String,
    pub ns: i32,
}

impl PageConfig {
    pub fn new(title: impl Into<String>, ns: i32) -> Self {
        Self {
            title: title.into(),
            ns,
        }
    }
}

/// Per-document state shared by the token rules of one page.
#[derive(Debug)]
pub struct Env<'a> {
    site: &'a dyn SiteConfig,
    page: PageConfig,
    variables: BTreeMap<String, bool>,
}

impl<'a> Env<'a> {
    pub fn new(site: &'a dyn SiteConfig, page: PageConfig) -> Self {
        Self {
            site,
            page,
            variables: BTreeMap::new(),
        }
    }

    pub fn site_config(&self) -> &'a dyn SiteConfig {
        self.site
    }

    pub fn page(&self) -> &PageConfig {
        &self.page
    }

    pub fn set_variable(&mut self, name: &str, value: bool) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn variable(&self, name: &str) -> Option<bool> {
        self.variables.get(name).copied()
    }

    pub fn variables(&self) -> &BTreeMap<String, bool> {
        &self.variables
    }

    pub fn make_title(&self, text: &str, default_ns: i32) -> Result<Title, TitleError> {
        Title::new_from_text(text, self.site, default_ns)
    }

    /// Prefixed database key for `text`, with `#fragment` appended unless
    /// `ignore_fragment` is set or the fragment is empty.
    pub fn normalized_title_key(
        &self,
        text: &str,
        ignore_fragment: bool,
    ) -> Result<String, TitleError> {
        let title = self.make_title(text, 0)?;
        let mut key = title.prefixed_db_key();
        if !ignore_fragment
            && let Some(fragment) = title.fragment()
            && !fragment.is_empty()
        {
            key.push('#');
            key.push_str(fragment);
        }
        Ok(key)
    }

    /// Resolve link text relative to the current page.
    ///
    /// `#frag` points into this page. In namespaces with subpages, `/sub`
    /// descends from the page and each leading `../` climbs one level, and the
    /// result is renormalized. With `resolve_only` the trimmed text comes back
    /// as written. Climbing past the root hands back `text` untouched.
    pub fn resolve_title(&self, text: &str, resolve_only: bool) -> Result<String, TitleError> {
        let mut resolved = trim_blanks(text).to_string();
        if resolved.starts_with('#') {
            resolved.insert_str(0, &self.page.title);
        }
        let mut title_key = resolved.clone();

        if self.site.namespace_has_subpages(self.page.ns) {
            let levels = leading_parent_levels(&resolved);
            let mut relative = false;
            if levels > 0 {
                let bits: Vec<&str> = self.page.title.split('/').collect();
                if bits.len() <= levels {
                    trace!(text, levels, "relative link climbs past page root");
                    return Ok(text.to_string());
                }
                let mut kept = bits[..bits.len() - levels].to_vec();
                let rest = &resolved[levels * 3..];
                if !rest.is_empty() {
                    kept.push(rest);
                }
                resolved = kept.join("/");
                relative = true;
            } else if resolved.starts_with('/') {
                resolved.insert_str(0, &self.page.title);
                relative = true;
            }

            if relative && !resolve_only {
                title_key = self.normalized_title_key(resolved.trim_end_matches('/'), false)?;
            }
        }

        if !resolve_only && let Some(stripped) = title_key.strip_prefix(':') {
            title_key = stripped.to_string();
        }
        Ok(title_key)
    }
}

fn leading_parent_levels(text: &str) -> usize {
    let mut levels = 0;
    let mut rest = text;
    while let Some(next) = rest.strip_prefix("../") {
        levels += 1;
        rest = next;
    }
    levels
}
