use dotenvy::dotenv;
use tracing::{error, info};

mod config;
mod handlers;
mod llm;
mod studio;
mod utils;

use config::CONFIG;
use handlers::commands::{self, parse_command, usage, Command};
use handlers::shell::run_shell;
use llm::GeminiClient;
use studio::Studio;
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_command(&args)?;
    if command == Command::Help {
        println!("{}", usage());
        return Ok(());
    }

    let studio = Studio::new(
        GeminiClient::new(&CONFIG),
        CONFIG.keep_result_on_failed_refinement,
    );
    info!("Starting Lookbook Studio");

    let outcome = match command {
        Command::Studio => run_shell(studio).await,
        Command::Generate(generate_args) => commands::generate_handler(&studio, generate_args).await,
        Command::Classify { hero } => commands::classify_handler(&studio, &hero).await,
        Command::Export(export_args) => commands::export_handler(export_args).await,
        Command::Help => Ok(()),
    };

    if let Err(err) = &outcome {
        error!("Command failed: {err:#}");
    }
    outcome
}
