//! Zen CLI - asset catalog and template rendering for the workflow workspace

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod display;
mod error;
mod exit_codes;
mod util;

use commands::Context;
use commands::assets::{self as asset_cmd, ListArgs};
use commands::template::{self as template_cmd, Destination, RenderArgs};
use config::ZenConfig;
use display::OutputFormat;
use error::Result;

/// Log filter variable; falls back to `warn`, or `debug` with `--debug`
const LOG_ENV: &str = "ZEN_LOG";

#[derive(Parser)]
#[command(name = "zen")]
#[command(author = "Zen Contributors")]
#[command(version)]
#[command(about = "Fetch, cache and render workflow assets", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: <workspace>/.zen/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace directory holding `.zen/`
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Query, fetch and sync catalog assets
    Assets {
        #[command(subcommand)]
        command: AssetsCommand,
    },

    /// Render catalog templates
    Template {
        #[command(subcommand)]
        command: TemplateCommand,
    },
}

#[derive(Subcommand)]
enum AssetsCommand {
    /// List catalog assets
    List {
        /// Only assets of this type (template, prompt, mcp, schema)
        #[arg(long = "type")]
        asset_type: Option<String>,

        /// Only assets in this category
        #[arg(long)]
        category: Option<String>,

        /// Only assets carrying every given tag
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Page size (default 50, max 1000)
        #[arg(long)]
        limit: Option<usize>,

        /// Skip this many matches
        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Fetch one asset and print its content
    Get {
        name: String,

        /// Always fetch from the repository
        #[arg(long)]
        no_cache: bool,

        /// Skip checksum verification
        #[arg(long)]
        no_verify: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Pull the manifest and refresh the catalog
    Sync {
        /// Rebuild the catalog even if the manifest is unchanged
        #[arg(long)]
        force: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Show repository, catalog and cache state
    Status {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Inspect and maintain the local cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show cache usage
    Info {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Remove every cached entry
    Clear,

    /// Remove expired and orphaned entries, then enforce the size limit
    Cleanup {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// Render a template to stdout or a file
    Render {
        name: String,

        /// Set a variable (key=value, dotted keys nest)
        #[arg(long = "var")]
        vars: Vec<String>,

        /// YAML or JSON file of variables, applied before --var
        #[arg(long)]
        vars_file: Option<PathBuf>,

        /// Write to this file instead of stdout
        #[arg(long, conflicts_with = "write")]
        out: Option<PathBuf>,

        /// Write to the template's declared output path
        #[arg(long)]
        write: bool,

        /// Undefined variables are errors and the output must validate
        #[arg(long)]
        strict: bool,
    },
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.debug);

    let code = match execute(cli) {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let token = CancellationToken::new();
        let on_interrupt = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("interrupted, cancelling");
                on_interrupt.cancel();
            }
        });

        let config = ZenConfig::load(cli.config.as_deref(), &cli.workspace)?;
        let ctx = Context {
            workspace: cli.workspace,
            config,
            token,
        };
        run(&ctx, cli.command).await
    })
}

async fn run(ctx: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::Assets { command } => match command {
            AssetsCommand::List {
                asset_type,
                category,
                tags,
                limit,
                offset,
                output,
            } => {
                let args = ListArgs {
                    asset_type: asset_type
                        .as_deref()
                        .map(asset_cmd::parse_asset_type)
                        .transpose()?,
                    category,
                    tags,
                    limit,
                    offset,
                };
                asset_cmd::list(ctx, &args, output).await
            }

            AssetsCommand::Get {
                name,
                no_cache,
                no_verify,
                output,
            } => asset_cmd::get(ctx, &name, no_cache, no_verify, output).await,

            AssetsCommand::Sync { force, output } => asset_cmd::sync(ctx, force, output).await,

            AssetsCommand::Status { output } => asset_cmd::status(ctx, output),

            AssetsCommand::Cache { command } => match command {
                CacheCommand::Info { output } => asset_cmd::cache_info(ctx, output),
                CacheCommand::Clear => asset_cmd::cache_clear(ctx),
                CacheCommand::Cleanup { output } => asset_cmd::cache_cleanup(ctx, output),
            },
        },

        Commands::Template { command } => match command {
            TemplateCommand::Render {
                name,
                vars,
                vars_file,
                out,
                write,
                strict,
            } => {
                let destination = match (out, write) {
                    (Some(path), _) => Destination::File(path),
                    (None, true) => Destination::Declared,
                    (None, false) => Destination::Stdout,
                };
                template_cmd::render(
                    ctx,
                    RenderArgs {
                        name: &name,
                        vars: &vars,
                        vars_file: vars_file.as_deref(),
                        destination,
                        strict,
                    },
                )
                .await
            }
        },
    }
}
