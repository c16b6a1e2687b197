//! Interactive loop over one session. Enhancement runs as a background task
//! so tabs can be switched while the image is being generated.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info};

use crate::analysis::Tab;
use crate::billing::PaymentDetails;
use crate::db::Database;
use crate::handlers::commands::{
    build_status_report, missing_sections_notice, render_snapshot, report_gated, TabSelection,
};
use crate::handlers::offer::{receipt_text, upgrade_offer_text, OfferReason};
use crate::session::{AnalysisOutcome, AppStatus, EnhancementOutcome, Session, SessionError};
use crate::utils::timing::{complete_command_timer, start_command_timer};

const SHELL_HELP: &str = "
Glow AI commands

analyze <path>   Analyze a photo
tab [name]       Show the current tab, or switch to analysis, visualize or plan
enhance          Generate your AI glow-up image (runs in the background)
save <path>      Download the enhanced image (Premium)
export <path>    Download the transformation plan as HTML (Premium)
upgrade          Start the Premium free trial
status           Show tier and usage
reset            Start over with a new photo
help             Show this list
quit             Leave
";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellCommand {
    Analyze(PathBuf),
    Tab(Option<Tab>),
    Enhance,
    Save(PathBuf),
    Export(PathBuf),
    Upgrade,
    Status,
    Reset,
    Help,
    Quit,
}

fn parse_shell_command(line: &str) -> std::result::Result<Option<ShellCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    let require_path = |usage: &str| -> std::result::Result<PathBuf, String> {
        if arg.is_empty() {
            Err(format!("Usage: {usage}"))
        } else {
            Ok(PathBuf::from(arg))
        }
    };

    let command = match name.to_lowercase().as_str() {
        "analyze" | "scan" => ShellCommand::Analyze(require_path("analyze <path>")?),
        "tab" if arg.is_empty() => ShellCommand::Tab(None),
        "tab" => ShellCommand::Tab(Some(
            Tab::parse(arg).ok_or_else(|| "Usage: tab analysis|visualize|plan".to_string())?,
        )),
        "enhance" => ShellCommand::Enhance,
        "save" => ShellCommand::Save(require_path("save <path>")?),
        "export" => ShellCommand::Export(require_path("export <path>")?),
        "upgrade" => ShellCommand::Upgrade,
        "status" => ShellCommand::Status,
        "reset" => ShellCommand::Reset,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("Unknown command: {other}. Type `help`.")),
    };
    Ok(Some(command))
}

pub struct Shell {
    session: Arc<Session>,
    db: Database,
    lines: Lines<BufReader<Stdin>>,
}

impl Shell {
    pub fn new(session: Arc<Session>, db: Database) -> Self {
        Self {
            session,
            db,
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        print!("{label}");
        std::io::stdout().flush().context("Failed to flush stdout")?;
        Ok(self.lines.next_line().await?)
    }

    pub async fn run(mut self) -> Result<()> {
        info!("Interactive shell started");
        println!("Type `help` for commands.");

        while let Some(line) = self.prompt("glow> ").await? {
            let command = match parse_shell_command(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(message) => {
                    println!("{message}");
                    continue;
                }
            };
            if command == ShellCommand::Quit {
                break;
            }
            if let Err(err) = self.dispatch(command).await {
                error!("Shell command failed: {:#}", err);
                println!("{err}");
            }
        }

        info!("Interactive shell finished");
        Ok(())
    }

    async fn dispatch(&mut self, command: ShellCommand) -> Result<()> {
        match command {
            ShellCommand::Analyze(path) => self.analyze(path).await,
            ShellCommand::Tab(Some(tab)) => {
                self.session.set_tab(tab);
                self.show_tab(tab);
                Ok(())
            }
            ShellCommand::Tab(None) => {
                self.show_tab(self.session.snapshot().tab);
                Ok(())
            }
            ShellCommand::Enhance => {
                self.spawn_enhancement();
                Ok(())
            }
            ShellCommand::Save(path) => {
                let outcome = self.session.save_enhanced_image(&path).await?;
                report_gated(outcome, OfferReason::SaveImage, "Saved enhanced image to");
                Ok(())
            }
            ShellCommand::Export(path) => {
                let outcome = self.session.export_plan(&path).await?;
                report_gated(outcome, OfferReason::ExportPlan, "Exported plan to");
                Ok(())
            }
            ShellCommand::Upgrade => self.upgrade().await,
            ShellCommand::Status => {
                println!("{}", build_status_report(&self.session, &self.db).await);
                Ok(())
            }
            ShellCommand::Reset => {
                self.session.reset();
                println!("Ready for a new photo.");
                Ok(())
            }
            ShellCommand::Help => {
                println!("{SHELL_HELP}");
                Ok(())
            }
            ShellCommand::Quit => Ok(()),
        }
    }

    fn show_tab(&self, tab: Tab) {
        match render_snapshot(&self.session.snapshot(), TabSelection::One(tab)) {
            Some(text) => println!("{text}"),
            None => println!("No results yet. Run `analyze <path>` first."),
        }
    }

    async fn analyze(&mut self, path: PathBuf) -> Result<()> {
        let mut timer = start_command_timer("shell.analyze", Some(&path.display().to_string()));
        let upload = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        println!("Analyzing your features...");
        let outcome = match self.session.analyze(&upload).await {
            Ok(outcome) => outcome,
            Err(err) => {
                complete_command_timer(&mut timer, "error", Some(err.to_string()));
                return Err(err.into());
            }
        };

        match outcome {
            AnalysisOutcome::Completed(result) => {
                if let Some(notice) = missing_sections_notice(&result) {
                    println!("{notice}");
                }
                self.show_tab(Tab::Analysis);
                complete_command_timer(&mut timer, "success", None);
            }
            AnalysisOutcome::LimitReached => {
                println!("{}", upgrade_offer_text(OfferReason::ScanLimit));
                complete_command_timer(&mut timer, "limited", None);
            }
            AnalysisOutcome::Failed(message) => {
                println!("{message}");
                complete_command_timer(&mut timer, "error", Some(message.to_string()));
            }
            AnalysisOutcome::Discarded => {
                complete_command_timer(&mut timer, "discarded", None);
            }
        }
        Ok(())
    }

    fn spawn_enhancement(&self) {
        let snapshot = self.session.snapshot();
        if snapshot.status != AppStatus::Result {
            println!("No results yet. Run `analyze <path>` first.");
            return;
        }
        if snapshot.enhancing {
            println!("Your glow up is already rendering.");
            return;
        }

        println!("Rendering your glow up in the background...");
        let session = self.session.clone();
        tokio::spawn(async move {
            let mut timer = start_command_timer("shell.enhance", None);
            match session.enhance().await {
                Ok(EnhancementOutcome::Completed(image)) => {
                    println!(
                        "\nYour glow up is ready ({} bytes). Run `tab visualize`.",
                        image.bytes.len()
                    );
                    complete_command_timer(&mut timer, "success", None);
                }
                Ok(EnhancementOutcome::Failed(message)) => {
                    println!("\n{message}");
                    complete_command_timer(&mut timer, "error", Some(message.to_string()));
                }
                Ok(EnhancementOutcome::Discarded) => {
                    complete_command_timer(&mut timer, "discarded", None);
                }
                Err(err @ (SessionError::Busy(_) | SessionError::NoAnalysis)) => {
                    println!("\n{err}");
                    complete_command_timer(&mut timer, "rejected", Some(err.to_string()));
                }
                Err(err) => {
                    error!("Enhancement task failed: {}", err);
                    complete_command_timer(&mut timer, "error", Some(err.to_string()));
                }
            }
        });
    }

    async fn upgrade(&mut self) -> Result<()> {
        if self.session.tier().is_premium() {
            println!("You are already a Premium Member.");
            return Ok(());
        }
        println!("{}", upgrade_offer_text(OfferReason::Requested));

        let mut fields = Vec::with_capacity(4);
        for label in ["Card Number: ", "Expiry Date (MM/YY): ", "CVC: ", "Cardholder Name: "] {
            match self.prompt(label).await? {
                Some(value) => fields.push(value.trim().to_string()),
                None => return Ok(()),
            }
        }
        let [card_number, expiry, cvc, cardholder_name]: [String; 4] = fields
            .try_into()
            .map_err(|_| anyhow::anyhow!("Incomplete payment form"))?;
        let details = PaymentDetails {
            card_number,
            expiry,
            cvc,
            cardholder_name,
        };

        let mut timer = start_command_timer("shell.upgrade", None);
        println!("Processing...");
        match self.session.upgrade(&details).await {
            Ok(receipt) => {
                println!("{}", receipt_text(&receipt));
                complete_command_timer(&mut timer, "success", None);
                Ok(())
            }
            Err(err) => {
                complete_command_timer(&mut timer, "error", Some(err.to_string()));
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            parse_shell_command("analyze  ./me.jpg ").unwrap(),
            Some(ShellCommand::Analyze(PathBuf::from("./me.jpg")))
        );
        assert_eq!(
            parse_shell_command("TAB plan").unwrap(),
            Some(ShellCommand::Tab(Some(Tab::Plan)))
        );
        assert_eq!(parse_shell_command("tab").unwrap(), Some(ShellCommand::Tab(None)));
        assert_eq!(
            parse_shell_command("export my plan.html").unwrap(),
            Some(ShellCommand::Export(PathBuf::from("my plan.html")))
        );
        assert_eq!(parse_shell_command("   ").unwrap(), None);
    }

    #[test]
    fn rejects_missing_arguments_and_unknown_commands() {
        assert_eq!(
            parse_shell_command("save").unwrap_err(),
            "Usage: save <path>"
        );
        assert!(parse_shell_command("tab gallery").is_err());
        assert!(parse_shell_command("dance")
            .unwrap_err()
            .starts_with("Unknown command"));
    }
}
