#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use esmserve_core::{Config, LinkStrategy};
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "esmserve")]
#[command(author, version, about = "A no-bundle development web server for ES modules", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output and logs
    #[arg(long, global = true)]
    json: bool,

    /// Project root (defaults to the current directory)
    #[arg(long, global = true, value_name = "PATH", env = "ESMSERVE_ROOT")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the dev server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000, env = "ESMSERVE_PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "localhost", env = "ESMSERVE_HOST")]
        host: String,

        /// How discovered imports are advertised
        #[arg(long, value_enum, default_value_t = LinkArg::None)]
        link: LinkArg,

        /// Answer a missing /favicon.ico with 404 instead of the built-in icon
        #[arg(long)]
        no_icon_redirect: bool,
    },

    /// Print the URL a specifier is served at
    Resolve {
        /// Import specifier (e.g., "react", "./src/app.js")
        specifier: String,

        /// File the import appears in (defaults to <root>/index.html)
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,
    },

    /// List materialized packages
    Packages,

    /// Remove materialized packages (all when no name is given)
    Clean {
        /// Package to reset
        package: Option<String>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LinkArg {
    Push,
    Preload,
    None,
}

impl From<LinkArg> for LinkStrategy {
    fn from(arg: LinkArg) -> Self {
        match arg {
            LinkArg::Push => Self::Push,
            LinkArg::Preload => Self::Preload,
            LinkArg::None => Self::None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let config = Config::new(cwd);

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Commands::Serve {
            port,
            host,
            link,
            no_icon_redirect,
        } => {
            let mut config = config
                .with_port(port)
                .with_host(host)
                .with_link_strategy(link.into());
            if no_icon_redirect {
                config = config.with_icon_redirect(None);
            }
            commands::serve::run(config)
        }
        Commands::Resolve { specifier, from } => {
            commands::resolve::run(config, &specifier, from, cli.json)
        }
        Commands::Packages => commands::packages::run(config, cli.json),
        Commands::Clean { package } => commands::clean::run(config, package.as_deref(), cli.json),
    }
}
