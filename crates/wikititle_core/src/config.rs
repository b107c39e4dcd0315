use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::site::{NamespaceCase, SiteConfig, normalize_namespace_name};
use crate::title::illegal_chars_matcher;

pub const DEFAULT_PROJECT_NAME: &str = "Project";
pub const DEFAULT_LEGAL_TITLE_CHARS: &str = r#" %!"$&'()*,\-.\/0-9:;=?@A-Z\\^_`a-z~\x80-\xFF+"#;

/// Built-in namespaces as `(id, canonical name)`. Ids 4 and 5 are displayed
/// under the configured project name.
const STANDARD_NAMESPACES: &[(i32, &str)] = &[
    (-2, "Media"),
    (-1, "Special"),
    (0, ""),
    (1, "Talk"),
    (2, "User"),
    (3, "User talk"),
    (4, "Project"),
    (5, "Project talk"),
    (6, "File"),
    (7, "File talk"),
    (8, "MediaWiki"),
    (9, "MediaWiki talk"),
    (10, "Template"),
    (11, "Template talk"),
    (12, "Help"),
    (13, "Help talk"),
    (14, "Category"),
    (15, "Category talk"),
];

const STANDARD_NAMESPACE_ALIASES: &[(&str, i32)] = &[("Image", 6), ("Image talk", 7)];

const NAMESPACES_WITH_SUBPAGES: &[i32] = &[1, 2, 3, 4, 5, 7, 8, 9, 10, 11, 12, 13, 15];

const STANDARD_SPECIAL_PAGES: &[(&str, &[&str])] = &[
    ("AllPages", &["All_pages"]),
    ("BlankPage", &[]),
    ("Categories", &[]),
    ("Contributions", &["Contribs"]),
    ("Emailuser", &["Email_user"]),
    ("Log", &["Logs"]),
    ("Movepage", &["Move_page"]),
    ("Mypage", &["My_page"]),
    ("Mytalk", &["My_talk"]),
    ("Newpages", &["New_pages"]),
    ("Preferences", &[]),
    ("Randompage", &["Random", "Random_page"]),
    ("RecentChanges", &["Recent_changes"]),
    ("Search", &[]),
    ("SpecialPages", &["Special_pages"]),
    ("Upload", &[]),
    ("Userlogin", &["Login"]),
    ("Version", &[]),
    ("Watchlist", &["My_watchlist"]),
    ("Whatlinkshere", &["What_links_here"]),
];

/// Behavior switches as `(canonical name, case sensitive, aliases)`.
const STANDARD_BEHAVIOR_SWITCHES: &[(&str, bool, &[&str])] = &[
    ("notoc", false, &["__NOTOC__"]),
    ("nogallery", false, &["__NOGALLERY__"]),
    ("forcetoc", false, &["__FORCETOC__"]),
    ("toc", false, &["__TOC__"]),
    ("noeditsection", false, &["__NOEDITSECTION__"]),
    ("newsectionlink", true, &["__NEWSECTIONLINK__"]),
    ("nonewsectionlink", true, &["__NONEWSECTIONLINK__"]),
    ("hiddencat", true, &["__HIDDENCAT__"]),
    ("expectunusedcategory", true, &["__EXPECTUNUSEDCATEGORY__"]),
    ("index", true, &["__INDEX__"]),
    ("noindex", true, &["__NOINDEX__"]),
    ("staticredirect", true, &["__STATICREDIRECT__"]),
    ("notitleconvert", false, &["__NOTITLECONVERT__", "__NOTC__"]),
    ("nocontentconvert", false, &["__NOCONTENTCONVERT__", "__NOCC__"]),
];

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiConfig {
    #[serde(default)]
    pub site: SiteSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub project_name: Option<String>,
    pub legal_title_chars: Option<String>,
    #[serde(default)]
    pub custom_namespaces: Vec<CustomNamespace>,
    #[serde(default)]
    pub special_page_aliases: Vec<SpecialPageAlias>,
    #[serde(default)]
    pub magic_words: Vec<MagicWordEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CustomNamespace {
    pub name: String,
    pub id: i32,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub case: NamespaceCase,
    #[serde(default)]
    pub subpages: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SpecialPageAlias {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MagicWordEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl WikiConfig {
    /// Resolve the project namespace name: env WIKI_PROJECT_NAME > config > DEFAULT_PROJECT_NAME.
    pub fn project_name(&self) -> String {
        if let Ok(value) = env::var("WIKI_PROJECT_NAME") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.site
            .project_name
            .clone()
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string())
    }

    pub fn legal_title_chars(&self) -> &str {
        self.site
            .legal_title_chars
            .as_deref()
            .unwrap_or(DEFAULT_LEGAL_TITLE_CHARS)
    }
}

/// Load and parse a WikiConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiConfig> {
    if !config_path.exists() {
        return Ok(WikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// In-memory [`SiteConfig`] seeded with the standard wiki namespaces.
#[derive(Debug, Clone)]
pub struct StaticSiteConfig {
    namespace_names: BTreeMap<i32, String>,
    namespace_ids: HashMap<String, i32>,
    canonical_ids: HashMap<String, i32>,
    namespace_cases: HashMap<i32, NamespaceCase>,
    subpage_namespaces: HashSet<i32>,
    legal_title_chars: String,
    special_pages: HashMap<String, String>,
    magic_words: HashMap<String, String>,
    magic_words_folded: HashMap<String, String>,
}

impl Default for StaticSiteConfig {
    fn default() -> Self {
        Self::with_project_name(DEFAULT_PROJECT_NAME)
    }
}

impl StaticSiteConfig {
    /// Standard namespaces, special pages and behavior switches, with namespace 4
    /// displayed as `project_name`.
    pub fn with_project_name(project_name: &str) -> Self {
        let mut site = Self {
            namespace_names: BTreeMap::new(),
            namespace_ids: HashMap::new(),
            canonical_ids: HashMap::new(),
            namespace_cases: HashMap::new(),
            subpage_namespaces: NAMESPACES_WITH_SUBPAGES.iter().copied().collect(),
            legal_title_chars: DEFAULT_LEGAL_TITLE_CHARS.to_string(),
            special_pages: HashMap::new(),
            magic_words: HashMap::new(),
            magic_words_folded: HashMap::new(),
        };

        for &(id, canonical) in STANDARD_NAMESPACES {
            let display = match id {
                4 => project_name.to_string(),
                5 => format!("{project_name} talk"),
                _ => canonical.to_string(),
            };
            site.canonical_ids.insert(normalize_namespace_name(canonical), id);
            site.namespace_ids.insert(normalize_namespace_name(canonical), id);
            site.namespace_ids.insert(normalize_namespace_name(&display), id);
            site.namespace_names.insert(id, display);
            site.namespace_cases.insert(id, NamespaceCase::FirstLetter);
        }
        for &(alias, id) in STANDARD_NAMESPACE_ALIASES {
            site.namespace_ids.insert(normalize_namespace_name(alias), id);
        }
        for &(name, aliases) in STANDARD_SPECIAL_PAGES {
            site.add_special_page(name, aliases.iter().copied());
        }
        for &(name, case_sensitive, aliases) in STANDARD_BEHAVIOR_SWITCHES {
            site.add_magic_word(name, case_sensitive, aliases.iter().copied());
        }
        site
    }

    /// Build the site tables from a loaded config, layering custom entries over
    /// the standard ones.
    pub fn from_config(config: &WikiConfig) -> Result<Self> {
        let project_name = config.project_name();
        let project_key = normalize_namespace_name(&project_name);
        if let Some(&(id, name)) = STANDARD_NAMESPACES
            .iter()
            .find(|(id, name)| *id != 4 && normalize_namespace_name(name) == project_key)
        {
            bail!("project name {project_name} collides with namespace {name} ({id})");
        }
        let mut site = Self::with_project_name(&project_name);
        site.legal_title_chars = config.legal_title_chars().to_string();
        illegal_chars_matcher(&site.legal_title_chars).with_context(|| {
            format!(
                "legal_title_chars {:?} is not a valid character class",
                site.legal_title_chars
            )
        })?;

        for namespace in &config.site.custom_namespaces {
            if namespace.name.trim().is_empty() {
                bail!("custom namespace name cannot be empty");
            }
            if site.namespace_names.contains_key(&namespace.id) {
                bail!(
                    "custom namespace {} reuses namespace id {}",
                    namespace.name,
                    namespace.id
                );
            }
            let display = namespace.name.trim().replace('_', " ");
            let key = normalize_namespace_name(&display);
            if let Some(existing) = site.namespace_ids.get(&key) {
                bail!(
                    "custom namespace {} reuses the name of namespace {existing}",
                    namespace.name
                );
            }
            for alias in &namespace.aliases {
                let alias_key = normalize_namespace_name(alias.trim());
                if alias_key.is_empty() {
                    bail!("custom namespace {} has an empty alias", namespace.name);
                }
                if let Some(&existing) = site.namespace_ids.get(&alias_key)
                    && existing != namespace.id
                {
                    bail!(
                        "alias {alias} of custom namespace {} already names namespace {existing}",
                        namespace.name
                    );
                }
            }
            site.canonical_ids.insert(key.clone(), namespace.id);
            site.namespace_ids.insert(key, namespace.id);
            for alias in &namespace.aliases {
                site.namespace_ids.insert(normalize_namespace_name(alias.trim()), namespace.id);
            }
            site.namespace_names.insert(namespace.id, display);
            site.namespace_cases.insert(namespace.id, namespace.case);
            if namespace.subpages {
                site.subpage_namespaces.insert(namespace.id);
            }
        }
        for page in &config.site.special_page_aliases {
            if page.name.trim().is_empty() {
                bail!("special page name cannot be empty");
            }
            site.add_special_page(&page.name, page.aliases.iter().map(String::as_str));
        }
        for word in &config.site.magic_words {
            if word.name.trim().is_empty() {
                bail!("magic word name cannot be empty");
            }
            site.add_magic_word(
                &word.name,
                word.case_sensitive,
                word.aliases.iter().map(String::as_str),
            );
        }

        debug!(
            namespaces = site.namespace_names.len(),
            special_pages = site.special_pages.len(),
            magic_words = site.magic_words.len() + site.magic_words_folded.len(),
            "built site config"
        );
        Ok(site)
    }

    /// Ids of every known namespace, ascending.
    pub fn namespace_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.namespace_names.keys().copied()
    }

    fn add_special_page<'a>(&mut self, name: &str, aliases: impl Iterator<Item = &'a str>) {
        let name = name.trim().replace(' ', "_");
        self.special_pages.insert(special_page_key(&name), name.clone());
        for alias in aliases {
            self.special_pages.insert(special_page_key(alias), name.clone());
        }
    }

    fn add_magic_word<'a>(
        &mut self,
        name: &str,
        case_sensitive: bool,
        aliases: impl Iterator<Item = &'a str>,
    ) {
        for alias in aliases {
            if case_sensitive {
                self.magic_words.insert(alias.to_string(), name.to_string());
            } else {
                self.magic_words_folded.insert(alias.to_lowercase(), name.to_string());
            }
        }
    }
}

fn special_page_key(alias: &str) -> String {
    alias.trim().to_lowercase().replace(' ', "_")
}

impl SiteConfig for StaticSiteConfig {
    fn namespace_id(&self, name: &str) -> Option<i32> {
        self.namespace_ids.get(&normalize_namespace_name(name)).copied()
    }

    fn namespace_name(&self, id: i32) -> Option<String> {
        self.namespace_names.get(&id).cloned()
    }

    fn canonical_namespace_id(&self, canonical: &str) -> Option<i32> {
        self.canonical_ids.get(canonical).copied()
    }

    fn namespace_case(&self, id: i32) -> NamespaceCase {
        self.namespace_cases.get(&id).copied().unwrap_or_default()
    }

    fn namespace_has_subpages(&self, id: i32) -> bool {
        self.subpage_namespaces.contains(&id)
    }

    fn legal_title_chars(&self) -> &str {
        &self.legal_title_chars
    }

    fn canonical_special_page_name(&self, alias: &str) -> Option<String> {
        self.special_pages.get(&special_page_key(alias)).cloned()
    }

    fn magic_word_canonical_name(&self, word: &str) -> String {
        self.magic_words
            .get(word)
            .or_else(|| self.magic_words_folded.get(&word.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| word.to_string())
    }
}
