use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tsgraph::cli::{self, OutputFormat};
use tsgraph::config::{Config, CONFIG_FILE_NAME};
use tsgraph::indexer::Indexer;
use tsgraph::query::engine::UsageQuery;

#[derive(Parser)]
#[command(name = "tsgraph")]
#[command(version)]
#[command(about = "TypeScript/JavaScript symbol, route and import index for AI agents via MCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project directory (shorthand for 'tsgraph start <project>')
    #[arg(value_name = "PROJECT")]
    project: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./.tsgraph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio - default command
    Start {
        /// Project to analyze before serving
        project: Option<String>,

        /// Ignore any cached index for the initial analysis
        #[arg(short, long)]
        rebuild: bool,
    },

    /// Index a project and print a summary
    Index {
        /// Project directory to index
        #[arg(default_value = ".")]
        project: String,

        /// Include glob (repeatable)
        #[arg(short, long)]
        include: Vec<String>,

        /// Exclude glob (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Ignore any cached index
        #[arg(short, long)]
        force: bool,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Search symbols by name
    Search {
        query: String,

        #[arg(short, long, default_value = ".")]
        project: String,

        /// Symbol kind or 'all'
        #[arg(short, long, default_value = "all")]
        kind: String,

        /// Also list edges mentioning each symbol
        #[arg(short, long)]
        usages: bool,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Find importers of a file or edges mentioning a name
    Usages {
        #[arg(short, long, default_value = ".")]
        project: String,

        /// File path, relative to the project or absolute
        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        method: Option<String>,

        #[arg(long)]
        class: Option<String>,

        /// imports, usages or both
        #[arg(short = 't', long = "type", default_value = "both")]
        search_type: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Walk the dependency graph around a file or name
    Deps {
        entity: String,

        #[arg(short, long, default_value = ".")]
        project: String,

        /// incoming, outgoing or both
        #[arg(long, default_value = "both")]
        direction: String,

        #[arg(long, default_value_t = 3)]
        depth: usize,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List HTTP routes
    Routes {
        #[arg(short, long, default_value = ".")]
        project: String,

        /// HTTP verb filter
        #[arg(short, long)]
        method: Option<String>,

        /// Substring of the route path
        #[arg(long)]
        path: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show index statistics
    Stats {
        #[arg(short, long, default_value = ".")]
        project: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::from_dir(".")),
    }
}

/// Logs go to stderr; stdout carries MCP responses
fn init_logging(config: &Config, debug: bool, verbose: bool) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match config.logging.format.as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(dir) = cli.cache_dir {
        config.cache.directory = Some(dir);
    }
    init_logging(&config, cli.debug, cli.verbose);

    info!("tsgraph {} starting (config file: {})", env!("CARGO_PKG_VERSION"), CONFIG_FILE_NAME);

    let indexer = Indexer::new(config);

    // Handle shorthand: tsgraph <project>
    let command = cli.command.unwrap_or(Commands::Start {
        project: cli.project,
        rebuild: false,
    });

    match command {
        Commands::Start { project, rebuild } => {
            cli::start::start_server(indexer, project, rebuild).await?;
        }

        Commands::Index {
            project,
            include,
            exclude,
            force,
            format,
        } => {
            cli::index::index_project(&indexer, project, include, exclude, force, format).await?;
        }

        Commands::Search {
            query,
            project,
            kind,
            usages,
            limit,
            format,
        } => {
            cli::query::search(&indexer, project, query, kind, usages, limit, format).await?;
        }

        Commands::Usages {
            project,
            file,
            method,
            class,
            search_type,
            format,
        } => {
            let query = UsageQuery {
                file_path: file,
                method_name: method,
                class_name: class,
                search_type: cli::query::parse_search_type(&search_type)?,
            };
            cli::query::usages(&indexer, project, query, format).await?;
        }

        Commands::Deps {
            entity,
            project,
            direction,
            depth,
            format,
        } => {
            cli::query::dependencies(&indexer, project, entity, direction, depth, format).await?;
        }

        Commands::Routes {
            project,
            method,
            path,
            format,
        } => {
            cli::query::routes(&indexer, project, method, path, format).await?;
        }

        Commands::Stats { project, format } => {
            cli::stats::show_stats(&indexer, project, cli.verbose, format).await?;
        }
    }

    Ok(())
}
