//src/main.rs
mod cli;

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::stdout;
use std::net::SocketAddr;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gym_app_lib::server::{self, AppState};
use gym_app_lib::{AppService, Exercise};

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .init();
}

fn main() -> Result<()> {
    let cli_args = cli::parse_args();

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();
        eprintln!("Generating completion script for {}...", shell);
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    init_logging(cli_args.verbose);

    // Initialize the application service (loads config, connects to DB)
    let mut service =
        AppService::initialize().context("Failed to initialize application service")?;
    debug!("Using database at {:?}", service.get_db_path());

    match cli_args.command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }
        cli::Commands::Serve { bind } => {
            if let Some(bind) = bind {
                service.config.bind_address = bind;
            }
            service
                .config
                .validate()
                .with_context(|| format!("Invalid configuration in {:?}", service.get_config_path()))?;
            let addr: SocketAddr = service.config.bind_address.parse()?;
            let state = AppState::new(service).context("Failed to set up cookie signing")?;

            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(server::serve(state, addr))?;
        }
        cli::Commands::ListExercises { email } => {
            let user = service.get_user_by_email(&email)?;
            let exercises = service.list_exercises(user.id)?;
            if exercises.is_empty() {
                println!("No exercises defined for {}.", user.email);
            } else {
                print_exercise_table(&exercises);
            }
        }
        cli::Commands::ListWorkouts { email } => {
            let user = service.get_user_by_email(&email)?;
            let workouts = service.list_workouts(user.id)?;
            if workouts.is_empty() {
                println!("No workouts saved for {}.", user.email);
            }
            for workout in workouts {
                let detail = service.get_workout_detail(user.id, workout.id)?;
                println!(
                    "\n#{} {} ({})",
                    detail.workout.id,
                    detail.workout.title,
                    detail.workout.created_at.format("%Y-%m-%d %H:%M")
                );
                print_exercise_table(&detail.exercises);
            }
        }
        cli::Commands::DbPath => {
            println!("Database file is located at: {:?}", service.get_db_path());
        }
        cli::Commands::ConfigPath => {
            let path = service.get_config_path();
            if !path.exists() {
                bail!("Config file {:?} does not exist", path);
            }
            println!("Config file is located at: {:?}", path);
        }
    }

    Ok(())
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold).fg(Color::Green)
}

fn print_exercise_table(exercises: &[Exercise]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            header_cell("ID"),
            header_cell("Name"),
            header_cell("Load"),
            header_cell("Reps"),
        ]);

    for exercise in exercises {
        let load = match (exercise.load, exercise.unit) {
            (Some(load), Some(unit)) => format!("{load} {unit}"),
            (Some(load), None) => load.to_string(),
            (None, _) => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(exercise.id),
            Cell::new(&exercise.name),
            Cell::new(load),
            Cell::new(
                exercise
                    .repetitions
                    .map_or_else(|| "-".to_string(), |r| format!("{r}x")),
            ),
        ]);
    }
    println!("{table}");
}
