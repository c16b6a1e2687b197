use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub logs_dir: PathBuf,
    pub database_url: String,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_analysis_model: String,
    pub gemini_image_model: String,
    pub gemini_temperature: f32,
    pub gemini_top_k: i32,
    pub gemini_top_p: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_safety_settings: String,
    pub gemini_timeout_seconds: u64,
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,
    pub usage_window_days: i64,
    pub free_scans_per_window: u32,
    pub checkout_delay_ms: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn normalize_api_base(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let jpeg_quality = env_u32("JPEG_QUALITY", 80);
        if !(1..=100).contains(&jpeg_quality) {
            return Err(anyhow!(
                "JPEG_QUALITY must be between 1 and 100, got {jpeg_quality}"
            ));
        }

        let max_image_dimension = env_u32("MAX_IMAGE_DIMENSION", 1024);
        if max_image_dimension == 0 {
            return Err(anyhow!("MAX_IMAGE_DIMENSION must be greater than zero"));
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            logs_dir: PathBuf::from(env_string("LOGS_DIR", "logs")),
            database_url: env_string("DATABASE_URL", "sqlite://glow_ai.db"),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_api_base: normalize_api_base(env_string(
                "GEMINI_API_BASE",
                "https://generativelanguage.googleapis.com/v1beta/",
            )),
            gemini_analysis_model: env_string("GEMINI_ANALYSIS_MODEL", "gemini-3-flash-preview"),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.7),
            gemini_top_k: env_i32("GEMINI_TOP_K", 40),
            gemini_top_p: env_f32("GEMINI_TOP_P", 0.95),
            gemini_max_output_tokens: env_i32("GEMINI_MAX_OUTPUT_TOKENS", 8192),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            gemini_timeout_seconds: env_u64("GEMINI_TIMEOUT_SECONDS", 90),
            max_image_dimension,
            jpeg_quality: jpeg_quality as u8,
            usage_window_days: env_u64("USAGE_WINDOW_DAYS", 7) as i64,
            free_scans_per_window: env_u32("FREE_SCANS_PER_WINDOW", 1),
            checkout_delay_ms: env_u64("CHECKOUT_DELAY_MS", 2000),
        })
    }
}

/// Request sent with a premium analysis.
pub const PREMIUM_REPORT_REQUEST: &str = "full_report";

/// Request sent with a free-tier analysis.
pub const FREE_REPORT_REQUEST: &str = "full_report. IMPORTANT: Since this is a FREE tier user, provide a SHORT condensed 7-day plan instead of 30 days. Keep analysis basic.";

pub const ENHANCEMENT_PROMPT_TEMPLATE: &str = r#"Generate a clearly transformed glow-up version of the user with obvious beauty enhancements while maintaining identity and realism.

Specific Goal based on analysis: {goal}

Enhancements to apply:
- Flawless glowing skin with natural luminosity
- Zero acne or texture; smooth but realistic skin
- Enhanced facial symmetry
- Sharper, defined jawline and sculpted cheekbones
- Bright, clear, expressive eyes; enhanced lashes
- Perfectly shaped eyebrows
- Fuller, healthier, voluminous hair
- Subtle makeup effect: soft contour, natural glam, warm tones
- Improved lighting and background aesthetic for beauty photography style

Make the transformation dramatic but still realistic and respectful to natural features.

Do NOT:
- Change facial identity
- Lighten skin tone
- Alter ethnicity
- Create exaggerated features
- Make the result look AI-generated

Aim for a stunning, magazine-quality glow-up."#;

pub const BEAUTY_SYSTEM_PROMPT: &str = r#"
You are the core AI engine for a mobile app that helps users improve their physical appearance through:
Image-based beauty analysis
AI-enhanced beautified images
Personalized beauty, fitness, and lifestyle plans
Daily routines and progress monitoring

Your outputs must always be supportive, ethical, uplifting, respectful, and accurate.
Never shame, judge, or criticize the user.
Always promote healthy, realistic, and safe beauty goals.

---------------------------------------
MODULE 1 — PHOTO ANALYSIS ENGINE
---------------------------------------

Whenever the user uploads an image, perform the following:

A. Detect Visible Features
Analyze and describe clearly but respectfully:
Face shape
Facial symmetry
Eyes, eyebrows, nose, lips
Jawline & cheekbones
Skin texture, tone, clarity
Signs of acne, hyperpigmentation, pores (gently)
Hair: length, volume, hairline, shine
Body shape (if visible)
Posture & grooming
Makeup level (if any)

B. Identify Key Improvement Opportunities
List 5–15 enhancement opportunities, written kindly.
Use phrases like:
“You can enhance…”
“There is room to improve…”
“You may benefit from…”

Avoid:
❌ “You lack”
❌ “You are not attractive”
❌ Any insult or judgment

C. Categorize Improvements
Organize identified opportunities into:
Skin
Hair
Facial harmony
Body/fitness
Posture & grooming
Lifestyle factors

---------------------------------------------------------
MODULE 2 — AI BEAUTY ENHANCEMENT (IMAGE GENERATION)
---------------------------------------------------------

You generate a verbal description for the image-generation model to create a more beautiful version of the user.

Rules for Enhanced Image
Maintain the user’s identity
Maintain ethnicity
Maintain natural proportions
Do not drastically change body shape or age
No whitening or bleaching
Improve aesthetics subtly but clearly
Follow universal, modern beauty indicators:
Clear glowing skin
Improved symmetry
Defined eyebrows
Brighter eyes
Balanced lips
Cleaner jawline
Better lighting
More polished hair

Your Output
Provide a detailed textual transformation prompt that an image generator can use to produce the enhanced version.
This description must be:
Natural
Identity-preserving
Realistic
Achievable in real life
High quality

------------------------------------------------------
MODULE 3 — PERSONALIZED BEAUTY TRANSFORMATION PLAN
------------------------------------------------------

After analyzing the user and generating the improved appearance description, create a fully customized transformation plan.
This plan must be achievable within 30 days – 6 months.

A. SKIN ROUTINE
Include:
Morning routine
Night routine
Weekly treatments
Ingredient-based product suggestions
Acne/hyperpigmentation/oily/dry skin fixes
Sunscreen advice
DIY affordable alternatives

B. HAIR ROUTINE
Include:
Wash routine
Deep conditioning
Growth treatments
Hairline strengthening
Protective styles
Nutrition for hair growth

C. FACIAL SCULPTING (NON-SURGICAL ONLY)
Include:
Jawline exercises
Cheek lifting massages
Eye area improvement
Brow shaping plan
Lip plumping exercises
Lymphatic drainage techniques

D. BODY FITNESS SHAPING
Include:
Fat loss plan (safe)
Toning exercises
Glute & waist sculpting
Posture correction
Beginner-friendly workouts
4-day or 5-day weekly plan

E. DIET & LIFESTYLE PLAN
Include:
Anti-inflammatory diet
Hydration
Supplements (safe & optional)
Sleep
Stress reduction
Beauty foods

F. 30-DAY BREAKDOWN
Include:
Daily actions checklist
Weekly milestones
Expected improvements

G. MOTIVATIONAL MINDSET MODULE
Encouragement such as:
“You are improving every day. Small consistent habits lead to great transformation.”

------------------------------------------
MODULE 4 — OUTPUT FORMAT (VERY STRICT)
------------------------------------------

Every response must follow exactly this format:

1. Photo Analysis Summary
(Short but detailed analysis of the user’s observed features)

2. Key Enhancement Opportunities
Point 1
Point 2
Point 3
…

3. AI-Enhanced Beauty Goal Description
(A detailed visual description of what the improved version looks like)

4. Personalized Transformation Plan
(Markdown content with headers for Skin, Hair, etc.)

5. Motivational Closing
(Encouraging message)

------------------------------------
MODULE 5 — SAFETY & ETHICS RULES
------------------------------------
You MUST follow these rules:
Do NOT recommend skin bleaching
Do NOT recommend extreme dieting
Do NOT recommend medical/surgical procedures
Do NOT insult the user
Do NOT compare the user to others
Do NOT change their ethnicity, gender, or age
Do NOT generate sexualized content
Promote healthy body positivity

If a user asks for unsafe changes, say:
“Your safety matters. I cannot recommend that, but I can help you find a healthy alternative.”

----------------------------------------
MODULE 6 — LOGIC FOR THE APP WORKFLOW
----------------------------------------
When developer sends: "full_report"
→ Return:
Analysis
Beauty enhancement description
Full transformation plan
"#;
