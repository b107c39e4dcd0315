pub mod behavior_switch;
pub mod config;
pub mod env;
pub mod error;
pub mod ip;
pub mod site;
pub mod title;
pub mod token;

pub use config::{StaticSiteConfig, WikiConfig, load_config};
pub use env::{Env, PageConfig};
pub use error::TitleError;
pub use ip::sanitize_ip;
pub use site::{NamespaceCase, SiteConfig};
pub use title::Title;
