use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use dotenvy::dotenv;
use tracing::info;

mod analysis;
mod billing;
mod config;
mod db;
mod handlers;
mod imaging;
mod llm;
mod session;
mod utils;

use analysis::Tab;
use billing::PaymentDetails;
use config::CONFIG;
use db::Database;
use handlers::commands::{self, AnalyzeArgs, TabSelection};
use handlers::offer;
use handlers::shell::Shell;
use llm::{BeautyModel, GeminiClient, GeminiSettings};
use session::{Session, SessionOptions};
use utils::logging::init_logging;

#[derive(Debug)]
enum CliCommand {
    Analyze(AnalyzeArgs),
    Upgrade(PaymentDetails),
    Status,
    Shell,
    Help,
}

fn usage() -> &'static str {
    "Usage:
  glow-ai analyze <image> [--tab analysis|visualize|plan|all] [--enhance] [--save-image <path>] [--export-plan <path>]
  glow-ai upgrade --card <number> --expiry <MM/YY> --cvc <cvc> --name <cardholder>
  glow-ai status
  glow-ai shell"
}

fn next_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_analyze_args(args: &[String]) -> anyhow::Result<AnalyzeArgs> {
    let mut image_path: Option<PathBuf> = None;
    let mut tabs = TabSelection::One(Tab::Analysis);
    let mut enhance = false;
    let mut save_image = None;
    let mut export_plan = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--tab" => {
                let value = next_value(args, &mut index, "--tab")?;
                tabs = TabSelection::parse(value)
                    .ok_or_else(|| anyhow!("Invalid --tab value: {value}"))?;
            }
            "--enhance" => {
                enhance = true;
            }
            "--save-image" => {
                save_image = Some(PathBuf::from(next_value(args, &mut index, "--save-image")?));
            }
            "--export-plan" => {
                export_plan = Some(PathBuf::from(next_value(args, &mut index, "--export-plan")?));
            }
            other if other.starts_with("--") => {
                return Err(anyhow!("Unknown analyze argument: {other}\n{}", usage()));
            }
            other => {
                if image_path.is_some() {
                    return Err(anyhow!("Only one image can be analyzed at a time"));
                }
                image_path = Some(PathBuf::from(other));
            }
        }
        index += 1;
    }

    Ok(AnalyzeArgs {
        image_path: image_path.ok_or_else(|| anyhow!("An image path is required\n{}", usage()))?,
        tabs,
        enhance,
        save_image,
        export_plan,
    })
}

fn parse_upgrade_args(args: &[String]) -> anyhow::Result<PaymentDetails> {
    let mut details = PaymentDetails::default();

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--card" => details.card_number = next_value(args, &mut index, "--card")?.to_string(),
            "--expiry" => details.expiry = next_value(args, &mut index, "--expiry")?.to_string(),
            "--cvc" => details.cvc = next_value(args, &mut index, "--cvc")?.to_string(),
            "--name" => {
                details.cardholder_name = next_value(args, &mut index, "--name")?.to_string()
            }
            other => {
                return Err(anyhow!("Unknown upgrade argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    Ok(details)
}

fn parse_cli(args: &[String]) -> anyhow::Result<CliCommand> {
    match args.get(1).map(|value| value.as_str()) {
        None | Some("shell") => Ok(CliCommand::Shell),
        Some("analyze") => Ok(CliCommand::Analyze(parse_analyze_args(args)?)),
        Some("upgrade") => Ok(CliCommand::Upgrade(parse_upgrade_args(args)?)),
        Some("status") => Ok(CliCommand::Status),
        Some("help" | "--help" | "-h") => Ok(CliCommand::Help),
        Some(other) => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging(&CONFIG.logs_dir, &CONFIG.log_level);

    let args: Vec<String> = std::env::args().collect();
    let command = parse_cli(&args)?;
    if let CliCommand::Help = command {
        println!("{}", usage());
        return Ok(());
    }

    info!("Starting Glow AI v{}", env!("CARGO_PKG_VERSION"));
    let db = Database::init(&CONFIG.database_url).await?;
    if let Some(intro) = offer::take_intro(&db).await? {
        println!("{intro}");
    }

    let model: Arc<dyn BeautyModel> =
        Arc::new(GeminiClient::new(GeminiSettings::from_config(&CONFIG)));
    let session = Arc::new(
        Session::load(db.clone(), model, SessionOptions::from_config(&CONFIG)).await?,
    );

    match command {
        CliCommand::Analyze(analyze_args) => commands::analyze_command(&session, analyze_args).await,
        CliCommand::Upgrade(details) => commands::upgrade_command(&session, details).await,
        CliCommand::Status => commands::status_command(&session, &db).await,
        CliCommand::Shell => Shell::new(session, db).run().await,
        CliCommand::Help => Ok(()),
    }
}
