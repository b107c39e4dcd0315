use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use wikititle_core::behavior_switch::BehaviorSwitchHandler;
use wikititle_core::token::{DataAttribs, Kv, TagToken, Token, transform_tokens};
use wikititle_core::{Env, PageConfig, StaticSiteConfig, Title, load_config, sanitize_ip};

const DEFAULT_CONFIG_FILE: &str = "wikititle.toml";

#[derive(Debug, Parser)]
#[command(
    name = "wikititle",
    version,
    about = "Normalize wiki page titles against a site's namespace rules"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Site config (default: ./wikititle.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Normalize link text into a title")]
    Normalize(NormalizeArgs),
    #[command(about = "Resolve link text relative to a page")]
    Resolve(ResolveArgs),
    #[command(about = "Print the canonical form of an IP address")]
    Ip(IpArgs),
    #[command(about = "Show the page property a behavior switch sets")]
    Switch(SwitchArgs),
}

#[derive(Debug, Args)]
struct NormalizeArgs {
    text: String,
    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        help = "Namespace id used when the text has no prefix"
    )]
    namespace: i32,
    #[arg(long, help = "Emit JSON instead of key: value lines")]
    json: bool,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    text: String,
    #[arg(long, value_name = "TITLE", help = "Prefixed title of the linking page")]
    page: String,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    page_ns: i32,
    #[arg(long, help = "Skip subpage resolution and renormalization")]
    resolve_only: bool,
}

#[derive(Debug, Args)]
struct IpArgs {
    text: String,
}

#[derive(Debug, Args)]
struct SwitchArgs {
    word: String,
}

#[derive(Debug, Serialize)]
struct NormalizeReport<'a> {
    input: &'a str,
    namespace_id: i32,
    namespace_name: &'a str,
    key: &'a str,
    prefixed_db_key: String,
    prefixed_text: String,
    fragment: Option<&'a str>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    match cli.command {
        Some(Commands::Normalize(args)) => run_normalize(&config_path, args),
        Some(Commands::Resolve(args)) => run_resolve(&config_path, args),
        Some(Commands::Ip(IpArgs { text })) => {
            println!("{}", sanitize_ip(&text));
            Ok(())
        }
        Some(Commands::Switch(SwitchArgs { word })) => run_switch(&config_path, &word),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_site(config_path: &Path) -> Result<StaticSiteConfig> {
    let config = load_config(config_path)?;
    StaticSiteConfig::from_config(&config)
}

fn run_normalize(config_path: &Path, args: NormalizeArgs) -> Result<()> {
    let site = load_site(config_path)?;
    let title = match Title::new_from_text(&args.text, &site, args.namespace) {
        Ok(title) => title,
        Err(error) => bail!("{}: {error}", error.code()),
    };

    let report = NormalizeReport {
        input: &args.text,
        namespace_id: title.namespace_id(),
        namespace_name: title.namespace_name(),
        key: title.key(),
        prefixed_db_key: title.prefixed_db_key(),
        prefixed_text: title.prefixed_text(),
        fragment: title.fragment(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("namespace_id: {}", report.namespace_id);
    println!("namespace_name: {}", format_optional(Some(report.namespace_name)));
    println!("key: {}", report.key);
    println!("prefixed_db_key: {}", report.prefixed_db_key);
    println!("prefixed_text: {}", report.prefixed_text);
    println!("fragment: {}", format_optional(report.fragment));
    Ok(())
}

fn run_resolve(config_path: &Path, args: ResolveArgs) -> Result<()> {
    let site = load_site(config_path)?;
    let env = Env::new(&site, PageConfig::new(args.page, args.page_ns));
    match env.resolve_title(&args.text, args.resolve_only) {
        Ok(resolved) => {
            println!("{resolved}");
            Ok(())
        }
        Err(error) => bail!("{}: {error}", error.code()),
    }
}

fn run_switch(config_path: &Path, word: &str) -> Result<()> {
    let site = load_site(config_path)?;
    let mut env = Env::new(&site, PageConfig::new("", 0));
    let token = Token::Tag(TagToken::new(
        "behavior-switch",
        vec![Kv::new("word", word)],
        DataAttribs {
            tsr: Some((0, word.len())),
            src: Some(word.to_string()),
        },
    ));

    let tokens = transform_tokens(vec![token], &BehaviorSwitchHandler, &mut env);
    for token in &tokens {
        if let Some(property) = token.tag().and_then(|tag| tag.attribute("property")) {
            println!("property: {property}");
        }
    }
    println!(
        "canonical_name: {}",
        env.site_config().magic_word_canonical_name(word)
    );
    for (name, value) in env.variables() {
        println!("variable: {name}={value}");
    }
    Ok(())
}

fn format_optional(value: Option<&str>) -> &str {
    match value {
        Some("") => "<empty>",
        Some(value) => value,
        None => "<none>",
    }
}
