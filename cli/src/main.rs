//! # stubgen-cli
//!
//! Command-line tool that compiles a stubgen service schema into Rust
//! conversion functions and endpoint glue.
//!
//! ## Commands
//!
//! - `stubgen init` - Create a stubgen.toml
//! - `stubgen gen` - Generate one `<service>.rs` per service
//! - `stubgen check` - Compile every service without writing anything
//! - `stubgen inspect` - List services, methods and types
//! - `stubgen search <query>` - Fuzzy search across the schema
//!
//! See `stubgen --help` for the full command reference.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::process;

mod commands;
mod config;
mod logging;
mod ui;

#[derive(Parser)]
#[command(name = "stubgen")]
#[command(about = "stubgen - compile service schemas into Rust transport glue", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to stubgen.toml configuration file
    #[arg(short, long, global = true, default_value = "stubgen.toml")]
    config: String,

    /// Output as JSON (machine-readable format)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,

    /// Generate shell completions
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a stubgen.toml for a schema document
    Init {
        /// Schema document the project compiles
        #[arg(long, default_value = "schema.json")]
        schema: String,

        /// Project name (defaults to the current directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Generate Rust code for one or all services
    Gen {
        /// Only generate this service
        #[arg(short, long)]
        service: Option<String>,

        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<String>,

        /// Schema document (overrides config)
        #[arg(long, env = "STUBGEN_SCHEMA")]
        schema: Option<String>,

        /// Wire protocol (overrides config)
        #[arg(long, value_parser = ["grpc", "http"])]
        protocol: Option<String>,
    },

    /// Compile every service and report counts or the first incompatibility
    Check {
        /// Only check this service
        #[arg(short, long)]
        service: Option<String>,

        /// Schema document (overrides config)
        #[arg(long, env = "STUBGEN_SCHEMA")]
        schema: Option<String>,
    },

    /// List services, methods and types of the schema
    Inspect {
        /// Schema document (overrides config)
        #[arg(long, env = "STUBGEN_SCHEMA")]
        schema: Option<String>,
    },

    /// Fuzzy search across types, services, methods and errors
    Search {
        /// Text to look for
        query: String,

        /// Schema document (overrides config)
        #[arg(long, env = "STUBGEN_SCHEMA")]
        schema: Option<String>,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate the configuration file
    Validate,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "stubgen", &mut io::stdout());
        return;
    }

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    logging::init(logging::LogConfig {
        verbose: cli.verbose,
        json_logs: cli.json,
    })?;

    match command {
        Commands::Init { schema, name } => commands::config::init(&cli.config, &schema, name),
        Commands::Gen {
            service,
            out,
            schema,
            protocol,
        } => commands::gen::generate(
            &cli.config,
            commands::gen::GenOptions {
                schema: schema.as_deref(),
                service: service.as_deref(),
                out: out.as_deref(),
                protocol: protocol.as_deref(),
            },
            cli.json,
        ),
        Commands::Check { service, schema } => {
            commands::check::check(&cli.config, schema.as_deref(), service.as_deref(), cli.json)
        }
        Commands::Inspect { schema } => {
            commands::inspect::inspect(&cli.config, schema.as_deref(), cli.json)
        }
        Commands::Search { query, schema } => {
            commands::search::search(&cli.config, schema.as_deref(), &query, cli.json)
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Validate => commands::config::validate(&cli.config),
        },
    }
}
