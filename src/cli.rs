// src/cli.rs
use clap::{Command, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(author, version, about = "A small web app to assemble and track gym workouts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the web server
    Serve {
        /// Address to listen on (overrides bind_address from the config file)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// List the exercises a user has defined
    ListExercises {
        /// Email of the account
        #[arg(short, long)]
        email: String,
    },
    /// List a user's workouts with their exercises
    ListWorkouts {
        /// Email of the account
        #[arg(short, long)]
        email: String,
    },
    /// Show the path to the database file
    DbPath,
    /// Show the path to the config file
    ConfigPath,
    /// Print a shell completion script to stdout
    GenerateCompletion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> Command {
    Cli::command()
}
