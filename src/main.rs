use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storyfront::cache::StoryCache;
use storyfront::config::{self, SiteConfig};
use storyfront::fetch::HttpSource;
use storyfront::generate::{self, GenerateOptions};
use storyfront::output;
use tracing_subscriber::EnvFilter;

/// Flags for a generation run.
#[derive(clap::Args, Clone, Default)]
struct GenerateArgs {
    /// Ignore the cached stories and fetch the collection (the cache is still rewritten)
    #[arg(long)]
    no_cache: bool,

    /// Seed the story selection for a reproducible page
    #[arg(long)]
    seed: Option<u64>,

    /// Template to fill (overrides page.template)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Where to write the page (overrides page.output)
    #[arg(long)]
    output: Option<PathBuf>,
}

impl From<GenerateArgs> for GenerateOptions {
    fn from(args: GenerateArgs) -> Self {
        Self {
            no_cache: args.no_cache,
            seed: args.seed,
            template: args.template,
            output: args.output,
        }
    }
}

#[derive(Parser)]
#[command(name = "storyfront")]
#[command(about = "Render a CMS-driven home page from a story collection")]
#[command(long_about = "\
Render a CMS-driven home page from a story collection

Stories are read from the CMS collection API (cached on disk for an hour
by default), one is promoted to the cover, a few related stories and a few
per category are picked at random, and the results are filled into an
HTML template exported from the site builder.

Environment:
  WEBFLOW_API_TOKEN       bearer token for the CMS API (required to fetch)
  WEBFLOW_COLLECTION_ID   overrides source.collection_id
  RUST_LOG                log filter (default: storyfront=info)

A .env file in the working directory is loaded first.

Run 'storyfront gen-config' to generate a documented storyfront.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fill the template and write the page (the default)
    Generate(GenerateArgs),
    /// Fetch the whole collection and rewrite the cache
    Fetch,
    /// Validate config and report which template hooks are present
    Check {
        /// Template to inspect (overrides page.template)
        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Print a stock storyfront.toml with all options documented
    GenConfig,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Generate(GenerateArgs::default())) {
        Command::Generate(args) => {
            let config = load_config(&cli.config)?;
            let source = http_source(&config)?;
            let report = generate::generate(&config, &source, &args.into()).await?;
            output::print_generate_output(&report);
        }
        Command::Fetch => {
            let config = load_config(&cli.config)?;
            let source = http_source(&config)?;
            let cache = StoryCache::new(&config.cache.path, config.cache.freshness_secs);
            let stories = generate::refresh(&cache, &source, config.source.page_size).await?;
            output::print_fetch_output(stories.len(), cache.path());
        }
        Command::Check { template } => {
            let config = load_config(&cli.config)?;
            let report = generate::check(&config, template.as_deref())?;
            output::print_check_output(&report);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storyfront=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file plus environment overrides.
fn load_config(path: &std::path::Path) -> Result<SiteConfig, config::ConfigError> {
    let mut config = config::load_config(path)?;
    config.apply_env_overrides(config::process_env);
    Ok(config)
}

fn http_source(config: &SiteConfig) -> Result<HttpSource, Box<dyn std::error::Error>> {
    let token = config::api_token(config::process_env)?;
    Ok(HttpSource::new(&config.source, token)?)
}
