use crate::login::DEFAULT_COST;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file; defaults to the first of the usual locations
    #[clap(long, value_parser)]
    pub config: Option<PathBuf>,

    #[clap(long, value_parser, default_value_t = false)]
    pub verbose: bool,

    #[clap(long, value_parser)]
    pub log: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the search API over HTTP
    Serve {
        #[clap(long, value_parser)]
        root: Option<PathBuf>,

        #[clap(long, value_parser)]
        bind: Option<String>,
    },
    /// Run one search and print NDJSON records to stdout
    Search {
        query: String,

        #[clap(long, value_parser)]
        root: Option<PathBuf>,
    },
    /// Print the bcrypt hash to put under [security.users]
    HashPassword {
        password: String,

        #[clap(long, value_parser, default_value_t = DEFAULT_COST)]
        cost: u32,
    },
}
