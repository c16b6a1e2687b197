use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing::{error, warn};

use crate::analysis::report::render_tab;
use crate::analysis::{AnalysisResult, Tab};
use crate::billing::PaymentDetails;
use crate::config::CONFIG;
use crate::db::Database;
use crate::handlers::offer::{receipt_text, upgrade_offer_text, OfferReason};
use crate::session::{
    AnalysisOutcome, EnhancementOutcome, Gated, Session, SessionError, SessionSnapshot,
};
use crate::utils::timing::{complete_command_timer, start_command_timer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabSelection {
    One(Tab),
    All,
}

impl TabSelection {
    pub fn parse(value: &str) -> Option<Self> {
        if value.trim().eq_ignore_ascii_case("all") {
            return Some(TabSelection::All);
        }
        Tab::parse(value).map(TabSelection::One)
    }

    fn tabs(self) -> Vec<Tab> {
        match self {
            TabSelection::One(tab) => vec![tab],
            TabSelection::All => vec![Tab::Analysis, Tab::Visualize, Tab::Plan],
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    pub image_path: PathBuf,
    pub tabs: TabSelection,
    pub enhance: bool,
    pub save_image: Option<PathBuf>,
    pub export_plan: Option<PathBuf>,
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

pub fn missing_sections_notice(result: &AnalysisResult) -> Option<String> {
    if result.is_complete() {
        return None;
    }
    let missing = result.missing_sections();
    let titles: Vec<&str> = missing.iter().map(|section| section.title()).collect();
    Some(format!(
        "Note: the model's answer did not include: {}.",
        titles.join(", ")
    ))
}

/// Renders the selected tabs of the current result, or `None` before the
/// first successful analysis.
pub fn render_snapshot(snapshot: &SessionSnapshot, selection: TabSelection) -> Option<String> {
    let analysis = snapshot.analysis.as_ref()?;
    let mut out = format!("[{}]\n\n", snapshot.tier.label());
    for tab in selection.tabs() {
        out.push_str(&format!("--- {} ---\n", tab.label()));
        out.push_str(&render_tab(
            tab,
            analysis,
            snapshot.enhanced.as_deref(),
            snapshot.enhancing,
            snapshot.tier,
        ));
        if tab == Tab::Visualize {
            if let Some(message) = snapshot.enhancement_error {
                out.push_str(&format!("{message}\n"));
            }
        }
        out.push('\n');
    }
    Some(out)
}

/// Prints the outcome of a premium-only action; a free user sees the offer.
pub fn report_gated(outcome: Gated<PathBuf>, reason: OfferReason, done: &str) {
    match outcome {
        Gated::Granted(path) => println!("{done} {}", path.display()),
        Gated::UpgradeRequired => println!("{}", upgrade_offer_text(reason)),
    }
}

pub async fn analyze_command(session: &Session, args: AnalyzeArgs) -> Result<()> {
    let mut timer = start_command_timer("analyze", Some(&args.image_path.display().to_string()));

    let upload = tokio::fs::read(&args.image_path)
        .await
        .with_context(|| format!("Failed to read {}", args.image_path.display()))?;

    match session.analyze(&upload).await {
        Ok(AnalysisOutcome::Completed(result)) => {
            if let Some(notice) = missing_sections_notice(&result) {
                println!("{notice}\n");
            }
        }
        Ok(AnalysisOutcome::LimitReached) => {
            println!("{}", upgrade_offer_text(OfferReason::ScanLimit));
            complete_command_timer(&mut timer, "limited", None);
            return Ok(());
        }
        Ok(AnalysisOutcome::Failed(message)) => {
            complete_command_timer(&mut timer, "error", Some(message.to_string()));
            return Err(anyhow!(message));
        }
        Ok(AnalysisOutcome::Discarded) => {
            complete_command_timer(&mut timer, "discarded", None);
            return Ok(());
        }
        Err(err) => {
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            return Err(err.into());
        }
    }

    if args.enhance || args.save_image.is_some() {
        match session.enhance().await? {
            EnhancementOutcome::Failed(message) => warn!("Enhancement failed: {}", message),
            EnhancementOutcome::Completed(_) | EnhancementOutcome::Discarded => {}
        }
    }

    if let Some(report) = render_snapshot(&session.snapshot(), args.tabs) {
        println!("{report}");
    }

    if let Some(path) = &args.save_image {
        match session.save_enhanced_image(path).await {
            Ok(outcome) => {
                report_gated(outcome, OfferReason::SaveImage, "Saved enhanced image to");
            }
            Err(SessionError::NoEnhancedImage) => {
                println!("No enhanced image to save.");
            }
            Err(err) => return Err(err.into()),
        }
    }
    if let Some(path) = &args.export_plan {
        let outcome = session.export_plan(path).await?;
        report_gated(outcome, OfferReason::ExportPlan, "Exported plan to");
    }

    complete_command_timer(&mut timer, "success", None);
    Ok(())
}

pub async fn upgrade_command(session: &Session, details: PaymentDetails) -> Result<()> {
    let mut timer = start_command_timer("upgrade", None);
    if session.tier().is_premium() {
        println!("You are already a Premium Member.");
        complete_command_timer(&mut timer, "noop", None);
        return Ok(());
    }

    println!("Processing...");
    match session.upgrade(&details).await {
        Ok(receipt) => {
            println!("{}", receipt_text(&receipt));
            complete_command_timer(&mut timer, "success", None);
            Ok(())
        }
        Err(err) => {
            error!("Upgrade failed: {}", err);
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            Err(err.into())
        }
    }
}

pub async fn build_status_report(session: &Session, db: &Database) -> String {
    let mut report = String::new();
    report.push_str("Status snapshot\n");
    report.push_str(&format!("time_utc: {}\n", Utc::now().to_rfc3339()));
    let snapshot = session.snapshot();
    report.push_str(&format!("tier: {}\n", snapshot.tier.label()));
    report.push_str(&format!("session_status: {:?}\n", snapshot.status));
    report.push_str(&format!("current_tab: {}\n", snapshot.tab.label()));
    if let Some(image) = &snapshot.image {
        report.push_str(&format!(
            "photo: {}x{} {} ({} bytes)\n",
            image.width,
            image.height,
            image.mime_type,
            image.bytes.len()
        ));
    }
    if let Some(message) = snapshot.error {
        report.push_str(&format!("last_error: {message}\n"));
    }
    report.push_str(&format!(
        "analysis_in_flight: {}\n",
        bool_label(snapshot.analyzing)
    ));
    report.push_str(&format!(
        "enhancement_in_flight: {}\n",
        bool_label(snapshot.enhancing)
    ));

    match session.usage_summary().await {
        Ok(summary) => {
            report.push_str(&format!("scans_this_window: {}\n", summary.record.scan_count));
            let remaining = summary
                .scans_remaining()
                .map(|count| count.to_string())
                .unwrap_or_else(|| "unlimited".to_string());
            report.push_str(&format!("scans_remaining: {remaining}\n"));
            if let Some(resets_at) = summary.window_resets_at {
                report.push_str(&format!("window_resets_at: {}\n", resets_at.to_rfc3339()));
            }
        }
        Err(err) => report.push_str(&format!("usage_error: {err}\n")),
    }

    report.push_str(&format!(
        "gemini_configured: {}\n",
        bool_label(!CONFIG.gemini_api_key.trim().is_empty())
    ));
    report.push_str(&format!("analysis_model: {}\n", CONFIG.gemini_analysis_model));
    report.push_str(&format!("image_model: {}\n", CONFIG.gemini_image_model));
    report.push_str(&format!("database: {}\n", CONFIG.database_url));
    match db.entries().await {
        Ok(entries) => {
            for entry in entries {
                report.push_str(&format!("stored.{}: {}\n", entry.key, entry.value));
            }
        }
        Err(err) => report.push_str(&format!("db_error: {err}\n")),
    }
    report.push_str(&format!(
        "logs_dir_present: {}\n",
        bool_label(CONFIG.logs_dir.exists())
    ));
    report
}

pub async fn status_command(session: &Session, db: &Database) -> Result<()> {
    let mut timer = start_command_timer("status", None);
    println!("{}", build_status_report(session, db).await);
    complete_command_timer(&mut timer, "success", None);
    Ok(())
}
