use anyhow::Result;
use tracing::info;

use crate::billing::checkout::{LIST_PRICE, MONTHLY_PRICE, PLAN_NAME, TRIAL_DAYS};
use crate::billing::Receipt;
use crate::db::{Database, StorageKey};

const LANDING_FEATURES: [(&str, &str); 3] = [
    ("Face Analysis", "Detailed breakdown of your unique features."),
    ("AI Visualization", "See your potential results instantly."),
    ("Custom Plan", "Step-by-step skincare & fitness routines."),
];

const PREMIUM_FEATURES: [&str; 6] = [
    "Unlimited Glow-Up Images",
    "HD & Watermark-Free Downloads",
    "Full 30-Day Personalized Plans",
    "Diet, Fitness & Meal Plans",
    "Downloadable Plans",
    "AI Beauty Habit Tracker",
];

/// Why the upgrade offer is being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferReason {
    ScanLimit,
    SaveImage,
    ExportPlan,
    Requested,
}

impl OfferReason {
    fn headline(self) -> &'static str {
        match self {
            OfferReason::ScanLimit => "You've used your free scan for this week.",
            OfferReason::SaveImage => "HD downloads are a Premium feature.",
            OfferReason::ExportPlan => "Plan downloads are a Premium feature.",
            OfferReason::Requested => "Unlock your full transformation potential.",
        }
    }
}

pub fn intro_text() -> String {
    let mut text = String::new();
    text.push_str("#1 AI Beauty Consultant\n\n");
    text.push_str("Unlock Your Best Self with Glow AI\n");
    text.push_str(
        "Upload a photo to get a professional aesthetic analysis, realistic visualization, \
and a personalized 30-day glow-up plan.\n\n",
    );
    for (title, description) in LANDING_FEATURES {
        text.push_str(&format!("  * {title}: {description}\n"));
    }
    text.push_str("\nBy continuing, you agree to our Terms of Service & Privacy Policy.\n");
    text
}

pub fn upgrade_offer_text(reason: OfferReason) -> String {
    let mut text = String::new();
    text.push_str(&format!("{}\n\n", reason.headline()));
    text.push_str(&format!("{PLAN_NAME}\n"));
    for feature in PREMIUM_FEATURES {
        text.push_str(&format!("  + {feature}\n"));
    }
    text.push_str(&format!(
        "\nLimited Time Offer: {MONTHLY_PRICE}/month (was {LIST_PRICE}/month)\n"
    ));
    text.push_str(&format!(
        "Start a {TRIAL_DAYS}-Day Free Trial: $0.00 today, then {MONTHLY_PRICE}/mo.\n"
    ));
    text.push_str("Run `upgrade` to start your trial.\n");
    text
}

pub fn receipt_text(receipt: &Receipt) -> String {
    format!(
        "Welcome to {}! Your {}-day free trial has started (card ending {}). \
You will be billed {}/mo afterwards.\nConfirmed at {}.\n",
        receipt.plan,
        receipt.trial_days,
        receipt.card_last4,
        receipt.price_after_trial,
        receipt.confirmed_at.to_rfc3339()
    )
}

/// Returns the landing text the first time it is called for a store, and
/// `None` afterwards.
pub async fn take_intro(db: &Database) -> Result<Option<String>> {
    let seen = db.get(StorageKey::HasSeenIntro).await?;
    if seen.as_deref() == Some("true") {
        return Ok(None);
    }
    db.set(StorageKey::HasSeenIntro, "true").await?;
    info!("Showing landing intro for a new user");
    Ok(Some(intro_text()))
}
