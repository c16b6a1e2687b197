//! One user's working session: the photo being analyzed, the parsed report,
//! the optional enhanced image and the tier that gates what they may do.
//!
//! Analysis and enhancement each own a single request slot. A slot rejects
//! re-entry while its request is outstanding; the two slots are independent.
//! Requests cannot be cancelled, so `reset` and every new scan bump an epoch
//! instead and any response that comes back for an older epoch is dropped.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::analysis::report;
use crate::analysis::{parse_analysis, AnalysisResult, Tab};
use crate::billing::{
    Checkout, CheckoutError, PaymentDetails, Receipt, Tier, TierStore, UsageGate, UsagePolicy,
    UsageRecord,
};
use crate::config::Config;
use crate::db::Database;
use crate::imaging::{compress_image, ensure_image, EncodedImage, PreprocessError, PreprocessOptions};
use crate::llm::media::extension_for_mime;
use crate::llm::{BeautyModel, GeneratedImage};

pub const ANALYSIS_FAILED_MESSAGE: &str =
    "We couldn't analyze this image. Please ensure you are using a valid API key and try again.";
pub const ENHANCEMENT_FAILED_MESSAGE: &str = "Failed to generate transformation. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppStatus {
    #[default]
    Idle,
    Analyzing,
    Result,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Analysis,
    Enhancement,
}

impl Slot {
    pub fn label(self) -> &'static str {
        match self {
            Slot::Analysis => "Analysis",
            Slot::Enhancement => "Enhancement",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{} request already in progress", .0.label())]
    Busy(Slot),
    #[error("No analysis available yet; analyze a photo first")]
    NoAnalysis,
    #[error("No enhanced image available yet; run enhance first")]
    NoEnhancedImage,
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Completed(Arc<AnalysisResult>),
    LimitReached,
    Failed(&'static str),
    Discarded,
}

#[derive(Debug, Clone)]
pub enum EnhancementOutcome {
    Completed(Arc<GeneratedImage>),
    Failed(&'static str),
    Discarded,
}

/// Result of a premium-only action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gated<T> {
    Granted(T),
    UpgradeRequired,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub usage: UsagePolicy,
    pub preprocess: PreprocessOptions,
    pub checkout_delay: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            usage: UsagePolicy::from_config(config),
            preprocess: PreprocessOptions::from_config(config),
            checkout_delay: Duration::from_millis(config.checkout_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    status: AppStatus,
    tab: Tab,
    tier: Tier,
    image: Option<Arc<EncodedImage>>,
    analysis: Option<Arc<AnalysisResult>>,
    enhanced: Option<Arc<GeneratedImage>>,
    error: Option<&'static str>,
    enhancement_error: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: AppStatus,
    pub tab: Tab,
    pub tier: Tier,
    pub image: Option<Arc<EncodedImage>>,
    pub analysis: Option<Arc<AnalysisResult>>,
    pub enhanced: Option<Arc<GeneratedImage>>,
    pub error: Option<&'static str>,
    pub enhancement_error: Option<&'static str>,
    pub analyzing: bool,
    pub enhancing: bool,
}

#[derive(Debug, Clone)]
pub struct UsageSummary {
    pub tier: Tier,
    pub record: UsageRecord,
    pub free_scans: u32,
    pub window_resets_at: Option<DateTime<Utc>>,
}

impl UsageSummary {
    pub fn scans_remaining(&self) -> Option<u32> {
        if self.tier.is_premium() {
            return None;
        }
        let window_open = self
            .window_resets_at
            .map(|reset| reset >= Utc::now())
            .unwrap_or(false);
        if window_open {
            Some(self.free_scans.saturating_sub(self.record.scan_count))
        } else {
            Some(self.free_scans)
        }
    }
}

struct SlotGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SlotGuard<'a> {
    fn acquire(flag: &'a AtomicBool, slot: Slot) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::Busy(slot))?;
        Ok(Self { flag })
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Session {
    model: Arc<dyn BeautyModel>,
    gate: UsageGate,
    tiers: TierStore,
    checkout: Checkout,
    preprocess: PreprocessOptions,
    state: Mutex<SessionState>,
    analysis_busy: AtomicBool,
    enhancement_busy: AtomicBool,
    epoch: AtomicU64,
}

impl Session {
    pub async fn load(
        db: Database,
        model: Arc<dyn BeautyModel>,
        options: SessionOptions,
    ) -> anyhow::Result<Self> {
        let tiers = TierStore::new(db.clone());
        let tier = tiers.load().await?;
        info!("Session loaded for {} user", tier);

        Ok(Self {
            model,
            gate: UsageGate::new(db, options.usage),
            tiers,
            checkout: Checkout::new(options.checkout_delay),
            preprocess: options.preprocess,
            state: Mutex::new(SessionState {
                tier,
                ..SessionState::default()
            }),
            analysis_busy: AtomicBool::new(false),
            enhancement_busy: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            status: state.status,
            tab: state.tab,
            tier: state.tier,
            image: state.image.clone(),
            analysis: state.analysis.clone(),
            enhanced: state.enhanced.clone(),
            error: state.error,
            enhancement_error: state.enhancement_error,
            analyzing: self.analysis_busy.load(Ordering::Acquire),
            enhancing: self.enhancement_busy.load(Ordering::Acquire),
        }
    }

    pub fn tier(&self) -> Tier {
        self.state.lock().tier
    }

    pub fn set_tab(&self, tab: Tab) {
        self.state.lock().tab = tab;
    }

    /// Applies `update` only if the epoch has not moved since it was read.
    fn apply_if_current(&self, epoch: u64, update: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = self.state.lock();
        if self.epoch.load(Ordering::Acquire) != epoch {
            return false;
        }
        update(&mut state);
        true
    }

    fn fail_analysis(&self, epoch: u64) -> AnalysisOutcome {
        let applied = self.apply_if_current(epoch, |state| {
            state.status = AppStatus::Error;
            state.error = Some(ANALYSIS_FAILED_MESSAGE);
        });
        if applied {
            AnalysisOutcome::Failed(ANALYSIS_FAILED_MESSAGE)
        } else {
            AnalysisOutcome::Discarded
        }
    }

    pub async fn analyze(&self, upload: &[u8]) -> Result<AnalysisOutcome, SessionError> {
        let _slot = SlotGuard::acquire(&self.analysis_busy, Slot::Analysis)?;
        ensure_image(upload)?;

        let tier = self.tier();
        if !self.gate.check_limit(tier).await? {
            info!("Free scan limit reached for the current window");
            return Ok(AnalysisOutcome::LimitReached);
        }

        // A new scan supersedes the previous result and any enhancement
        // still rendering for it.
        let epoch = {
            let mut state = self.state.lock();
            let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            *state = SessionState {
                status: AppStatus::Analyzing,
                tier: state.tier,
                ..SessionState::default()
            };
            epoch
        };

        let options = self.preprocess;
        let data = upload.to_vec();
        let compressed = tokio::task::spawn_blocking(move || compress_image(&data, options)).await;
        let image = match compressed {
            Ok(Ok(image)) => Arc::new(image),
            Ok(Err(err)) => {
                error!("Image preprocessing failed: {}", err);
                return Ok(self.fail_analysis(epoch));
            }
            Err(err) => {
                error!("Image preprocessing task failed: {}", err);
                return Ok(self.fail_analysis(epoch));
            }
        };
        self.apply_if_current(epoch, |state| state.image = Some(image.clone()));

        let raw_text = match self.model.analyze_image(&image, tier).await {
            Ok(text) => text,
            Err(err) => {
                error!("Analysis failed: {:#}", err);
                return Ok(self.fail_analysis(epoch));
            }
        };

        // The model was paid for even if the user has moved on.
        self.gate.record_usage(tier).await?;

        let parsed = Arc::new(parse_analysis(&raw_text));
        let missing = parsed.missing_sections();
        if !missing.is_empty() {
            warn!(
                "Model response is missing {} section header(s): {:?}",
                missing.len(),
                missing
            );
        }

        let applied = self.apply_if_current(epoch, |state| {
            state.status = AppStatus::Result;
            state.tab = Tab::Analysis;
            state.analysis = Some(parsed.clone());
            state.enhanced = None;
            state.enhancement_error = None;
        });
        if !applied {
            warn!("Discarding analysis response for a superseded session");
            return Ok(AnalysisOutcome::Discarded);
        }

        Ok(AnalysisOutcome::Completed(parsed))
    }

    pub async fn enhance(&self) -> Result<EnhancementOutcome, SessionError> {
        let _slot = SlotGuard::acquire(&self.enhancement_busy, Slot::Enhancement)?;

        let (epoch, image, goal) = {
            let mut state = self.state.lock();
            if state.status != AppStatus::Result {
                return Err(SessionError::NoAnalysis);
            }
            let (Some(image), Some(analysis)) = (state.image.clone(), state.analysis.clone()) else {
                return Err(SessionError::NoAnalysis);
            };
            state.enhancement_error = None;
            (
                self.epoch.load(Ordering::Acquire),
                image,
                analysis.visual_description.clone(),
            )
        };

        match self.model.generate_enhanced_image(&image, &goal).await {
            Ok(generated) => {
                let generated = Arc::new(generated);
                if !self.apply_if_current(epoch, |state| state.enhanced = Some(generated.clone())) {
                    warn!("Discarding enhanced image for a superseded analysis");
                    return Ok(EnhancementOutcome::Discarded);
                }
                info!(
                    "Enhanced image ready ({}, {} bytes)",
                    generated.mime_type,
                    generated.bytes.len()
                );
                Ok(EnhancementOutcome::Completed(generated))
            }
            Err(err) => {
                error!("{}", err);
                let applied = self.apply_if_current(epoch, |state| {
                    state.enhancement_error = Some(ENHANCEMENT_FAILED_MESSAGE);
                });
                if applied {
                    Ok(EnhancementOutcome::Failed(ENHANCEMENT_FAILED_MESSAGE))
                } else {
                    Ok(EnhancementOutcome::Discarded)
                }
            }
        }
    }

    pub async fn save_enhanced_image(&self, path: &Path) -> Result<Gated<PathBuf>, SessionError> {
        let (tier, status, enhanced) = {
            let state = self.state.lock();
            (state.tier, state.status, state.enhanced.clone())
        };
        if !tier.is_premium() {
            return Ok(Gated::UpgradeRequired);
        }
        if status != AppStatus::Result {
            return Err(SessionError::NoEnhancedImage);
        }
        let image = enhanced.ok_or(SessionError::NoEnhancedImage)?;

        let path = if path.extension().is_none() {
            path.with_extension(extension_for_mime(&image.mime_type))
        } else {
            path.to_path_buf()
        };
        tokio::fs::write(&path, &image.bytes)
            .await
            .with_context(|| format!("Failed to write image to {}", path.display()))?;
        info!("Saved enhanced image to {}", path.display());
        Ok(Gated::Granted(path))
    }

    pub async fn export_plan(&self, path: &Path) -> Result<Gated<PathBuf>, SessionError> {
        let (tier, status, analysis, enhanced) = {
            let state = self.state.lock();
            (
                state.tier,
                state.status,
                state.analysis.clone(),
                state.enhanced.clone(),
            )
        };
        if !tier.is_premium() {
            return Ok(Gated::UpgradeRequired);
        }
        if status != AppStatus::Result {
            return Err(SessionError::NoAnalysis);
        }
        let analysis = analysis.ok_or(SessionError::NoAnalysis)?;
        report::export_plan(path, &analysis, tier, enhanced.as_deref()).await?;
        Ok(Gated::Granted(path.to_path_buf()))
    }

    pub async fn upgrade(&self, details: &PaymentDetails) -> Result<Receipt, SessionError> {
        let receipt = self.checkout.process(details).await?;
        self.tiers.save(Tier::Premium).await?;
        self.state.lock().tier = Tier::Premium;
        Ok(receipt)
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        *state = SessionState {
            tier: state.tier,
            ..SessionState::default()
        };
    }

    pub async fn usage_summary(&self) -> anyhow::Result<UsageSummary> {
        let record = self.gate.usage().await?;
        let window_resets_at = self.gate.window_resets_at(&record);
        Ok(UsageSummary {
            tier: self.tier(),
            record,
            free_scans: self.gate.policy().free_scans,
            window_resets_at,
        })
    }
}
