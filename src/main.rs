use clap::{Parser, Subcommand};
use inquire::Confirm;
use prerender::config::{self, GeneratorConfig, UrlEntry};
use prerender::fallback::Fallback;
use prerender::routes::{Route, load_routes};
use prerender::types::FetchMethod;
use prerender::{cache, generate, output};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Per-run overrides layered over the config file.
#[derive(clap::Args, Clone)]
struct MakeArgs {
    /// Additional URL to pre-render (repeatable)
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// URL to leave out of the run (repeatable)
    #[arg(long = "skip-url", value_name = "URL")]
    skip_urls: Vec<String>,

    /// Disable route discovery; only listed URLs are fetched
    #[arg(long)]
    no_auto: bool,

    /// Cache directory
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Origin of the running application
    #[arg(long)]
    base_url: Option<String>,
}

#[derive(clap::Args, Clone)]
struct ConfirmArgs {
    /// Do not ask before deleting the cache directory's contents
    #[arg(long, short = 'y')]
    yes: bool,
}

#[derive(Parser)]
#[command(name = "prerender")]
#[command(about = "Pre-render a web application into static files")]
#[command(long_about = "\
Pre-render a web application into static files

URLs come from a routes file (auto-discovery) and from the `urls` list in
the config. Each URL is fetched, checked, and written to the cache
directory. A fallback table (.fallback.json) maps every processed URL to
its file so a runtime shim can serve the static copy.

Cache layout:

  static-site/
  ├── .fallback.json      # URL → file table
  ├── .gitignore          # optional
  ├── _.html              # /
  ├── about.html          # /about
  └── blog/
      └── post-1_x_1.html # /blog/post-1?x=1

Pages are skipped when their status is not in `status_codes`, or (with
auto-discovery) when they carry a CSRF token.

The binary fetches over HTTP only: set `fetch_method = \"external\"` and
point `base_url` at the running application.

Run 'prerender gen-config' to generate a documented prerender.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Routes file for auto-discovery ([[routes]] uri, methods)
    #[arg(long, global = true)]
    routes: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every URL and write the cache, fallback table and report
    Make(MakeArgs),
    /// Delete the contents of the cache directory
    Clean(ConfirmArgs),
    /// Clean, then make
    Build {
        #[command(flatten)]
        confirm: ConfirmArgs,
        #[command(flatten)]
        make: MakeArgs,
    },
    /// Show what the runtime shim would serve for a request URI
    Lookup {
        /// Request URI, e.g. "/about" or "/search?q=x"
        uri: String,
    },
    /// Print a stock prerender.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Make(make) => {
            let config = load_with_overrides(&cli.config, &make)?;
            run_make(&config, cli.routes.as_deref())?;
        }
        Command::Clean(confirm) => {
            let config = config::load_config(&cli.config)?;
            run_clean(&config, confirm.yes)?;
        }
        Command::Build { confirm, make } => {
            let config = load_with_overrides(&cli.config, &make)?;
            if run_clean(&config, confirm.yes)? {
                run_make(&config, cli.routes.as_deref())?;
            }
        }
        Command::Lookup { uri } => {
            let config = config::load_config(&cli.config)?;
            let shim = Fallback::load(&config.storage_dir);
            output::print_lookup(&shim, &uri);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_with_overrides(
    path: &Path,
    make: &MakeArgs,
) -> Result<GeneratorConfig, Box<dyn std::error::Error>> {
    let mut config = config::load_config(path)?;
    config
        .urls
        .extend(make.urls.iter().map(|u| UrlEntry::from(u.as_str())));
    config.skip_urls.extend(make.skip_urls.iter().cloned());
    if make.no_auto {
        config.auto = false;
    }
    if let Some(dir) = &make.storage_dir {
        config.storage_dir = dir.clone();
    }
    if let Some(base_url) = &make.base_url {
        config.base_url = base_url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run_make(
    config: &GeneratorConfig,
    routes_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let routes: Vec<Route> = match routes_path {
        Some(path) => load_routes(path)?,
        None => Vec::new(),
    };

    let in_process: Vec<String> = generate::plan_tasks(&routes, config)
        .into_iter()
        .filter(|t| t.fetch_method == FetchMethod::InProcess)
        .map(|t| t.url)
        .collect();
    if !in_process.is_empty() {
        return Err(format!(
            "{} URL(s) use the in-process fetch method, which needs an embedded application \
             (first: {}). Set fetch_method = \"external\" in {}.",
            in_process.len(),
            in_process[0],
            config::CONFIG_FILENAME
        )
        .into());
    }

    println!(
        "==> Pre-rendering {} → {}",
        config.base_url,
        config.storage_dir.display()
    );
    let result = generate::generate_external(config, &routes)?;
    output::print_report(&result.records);
    Ok(())
}

/// Returns false if the user declined.
fn run_clean(config: &GeneratorConfig, yes: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let dir = &config.storage_dir;
    if !dir.is_dir() {
        println!("==> Nothing to clean at {}", dir.display());
        return Ok(true);
    }
    if !yes {
        let proceed = Confirm::new(&format!("Delete everything in {}?", dir.display()))
            .with_default(false)
            .prompt()?;
        if !proceed {
            println!("Aborted.");
            return Ok(false);
        }
    }
    cache::clean_directory(dir)?;
    println!("==> Cleaned {}", dir.display());
    Ok(true)
}
