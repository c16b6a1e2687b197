use std::path::Path;

use anyhow::{Context, Result};
use pulldown_cmark::{html, Event, HeadingLevel, Options, Parser, Tag};
use tracing::info;

use crate::analysis::parser::{AnalysisResult, Section};
use crate::billing::Tier;
use crate::llm::GeneratedImage;

pub const PLAN_FOOTER: &str = "Generated by Glow AI - Beauty Transformation Engine";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Analysis,
    Visualize,
    Plan,
}

impl Tab {
    pub fn parse(value: &str) -> Option<Tab> {
        match value.trim().to_ascii_lowercase().as_str() {
            "analysis" | "a" => Some(Tab::Analysis),
            "visualize" | "visualise" | "v" => Some(Tab::Visualize),
            "plan" | "p" => Some(Tab::Plan),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tab::Analysis => "Analysis",
            Tab::Visualize => "Visualize",
            Tab::Plan => "Plan",
        }
    }
}

pub fn plan_title(tier: Tier) -> &'static str {
    if tier.is_premium() {
        "Your 30-Day Transformation Plan"
    } else {
        "Basic 7-Day Transformation Plan"
    }
}

fn heading(title: &str) -> String {
    format!("{title}\n{}\n", "=".repeat(title.chars().count()))
}

fn body_or_placeholder(text: &str) -> &str {
    if text.trim().is_empty() {
        "(not provided)"
    } else {
        text
    }
}

pub fn render_analysis_tab(result: &AnalysisResult) -> String {
    let mut out = String::new();
    for section in [Section::Summary, Section::Opportunities] {
        out.push_str(&heading(section.title()));
        out.push_str(body_or_placeholder(result.section(section)));
        out.push_str("\n\n");
    }
    out
}

pub fn render_visualize_tab(
    result: &AnalysisResult,
    enhanced: Option<&GeneratedImage>,
    enhancing: bool,
    tier: Tier,
) -> String {
    let mut out = heading("AI Transformation");
    if enhancing {
        out.push_str("Rendering your glow up...\n\n");
    } else if let Some(image) = enhanced {
        out.push_str(&format!(
            "Glow AI Goal image ready ({}, {} bytes).\n",
            image.mime_type,
            image.bytes.len()
        ));
        if tier.is_premium() {
            out.push_str("Use `save <path>` to download it.\n\n");
        } else {
            out.push_str("Unlock HD download with Premium.\n\n");
        }
    } else {
        out.push_str("Ready to visualize the improved aesthetics? Run `enhance`.\n\n");
    }

    out.push_str("Target Aesthetic Description\n");
    out.push_str(&format!(
        "\"{}\"\n",
        body_or_placeholder(&result.visual_description)
    ));
    out
}

pub fn render_plan_tab(result: &AnalysisResult, tier: Tier) -> String {
    let mut out = String::new();
    if !result.closing.trim().is_empty() {
        out.push_str(&format!("\"{}\"\n\n", result.closing.trim()));
    }
    out.push_str(&heading(plan_title(tier)));
    out.push_str(body_or_placeholder(&result.plan));
    out.push_str("\n\n");
    if !tier.is_premium() {
        out.push_str(
            "Want a full 30-day detailed plan including diet & fitness? Upgrade to Premium.\n",
        );
    }
    out
}

pub fn render_tab(
    tab: Tab,
    result: &AnalysisResult,
    enhanced: Option<&GeneratedImage>,
    enhancing: bool,
    tier: Tier,
) -> String {
    match tab {
        Tab::Analysis => render_analysis_tab(result),
        Tab::Visualize => render_visualize_tab(result, enhanced, enhancing, tier),
        Tab::Plan => render_plan_tab(result, tier),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

// Plan headings sit under the page title, so each level moves down two.
fn demote_heading(level: HeadingLevel) -> HeadingLevel {
    match level {
        HeadingLevel::H1 => HeadingLevel::H3,
        HeadingLevel::H2 => HeadingLevel::H4,
        HeadingLevel::H3 => HeadingLevel::H5,
        other => other,
    }
}

pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Start(Tag::Heading(level, id, classes)) => {
            Event::Start(Tag::Heading(demote_heading(level), id, classes))
        }
        Event::End(Tag::Heading(level, id, classes)) => {
            Event::End(Tag::Heading(demote_heading(level), id, classes))
        }
        // Markup from the model is shown as text, never rendered.
        Event::Html(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

pub fn plan_to_html(
    result: &AnalysisResult,
    tier: Tier,
    enhanced: Option<&GeneratedImage>,
) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
<title>GlowAI Transformation Plan</title>\n</head>\n<body>\n",
    );
    if !result.closing.trim().is_empty() {
        page.push_str(&format!(
            "<blockquote class=\"motivation\">\"{}\"</blockquote>\n",
            escape_html(result.closing.trim())
        ));
    }
    if let Some(image) = enhanced {
        page.push_str(&format!(
            "<img class=\"glow-goal\" alt=\"Glow AI Goal\" src=\"{}\">\n",
            image.to_data_url()
        ));
    }
    page.push_str(&format!("<h2>{}</h2>\n", plan_title(tier)));
    page.push_str(&markdown_to_html(&result.plan));
    page.push_str(&format!("<footer>{PLAN_FOOTER}</footer>\n</body>\n</html>\n"));
    page
}

pub async fn export_plan(
    path: &Path,
    result: &AnalysisResult,
    tier: Tier,
    enhanced: Option<&GeneratedImage>,
) -> Result<()> {
    let page = plan_to_html(result, tier, enhanced);
    tokio::fs::write(path, page)
        .await
        .with_context(|| format!("Failed to write plan to {}", path.display()))?;
    info!("Exported transformation plan to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::parser::parse_analysis;

    fn sample() -> AnalysisResult {
        parse_analysis(
            "1. Photo Analysis Summary\nBalanced features.\n\
2. Key Enhancement Opportunities\n- Hydrate\n\
3. AI-Enhanced Beauty Goal Description\nGlowing skin.\n\
4. Personalized Transformation Plan\n# Skin\n- SPF 50 & reapply\n## Hair\n- Oil weekly\n\
5. Motivational Closing\nSmall habits & big results.",
        )
    }

    #[test]
    fn tab_names_parse() {
        assert_eq!(Tab::parse("Plan"), Some(Tab::Plan));
        assert_eq!(Tab::parse(" v "), Some(Tab::Visualize));
        assert_eq!(Tab::parse("settings"), None);
    }

    #[test]
    fn plan_tab_varies_by_tier() {
        let result = sample();
        let free = render_plan_tab(&result, Tier::Free);
        assert!(free.contains("Basic 7-Day Transformation Plan"));
        assert!(free.contains("Upgrade to Premium"));

        let premium = render_plan_tab(&result, Tier::Premium);
        assert!(premium.contains("Your 30-Day Transformation Plan"));
        assert!(!premium.contains("Upgrade to Premium"));
        assert!(premium.starts_with("\"Small habits & big results.\""));
    }

    #[test]
    fn analysis_tab_marks_empty_sections() {
        let result = parse_analysis("1. Photo Analysis Summary\nOnly a summary.");
        let rendered = render_analysis_tab(&result);
        assert!(rendered.contains("Only a summary."));
        assert!(rendered.contains("Key Enhancement Opportunities\n"));
        assert!(rendered.contains("(not provided)"));
    }

    #[test]
    fn html_export_demotes_headings_and_escapes_closing() {
        let html = plan_to_html(&sample(), Tier::Premium, None);
        assert!(html.contains("<h3>Skin</h3>"));
        assert!(html.contains("<h4>Hair</h4>"));
        assert!(html.contains("SPF 50 &amp; reapply"));
        assert!(html.contains("Small habits &amp; big results."));
        assert!(html.contains(PLAN_FOOTER));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn raw_markup_in_plan_is_escaped() {
        let result = parse_analysis(
            "4. Personalized Transformation Plan\n<script>alert(1)</script>\n\n\
- Try <img src=x onerror=alert(2)> tonight",
        );
        let html = plan_to_html(&result, Tier::Premium, None);
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<img src=x"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("&lt;img src=x onerror=alert(2)&gt;"));
    }

    #[tokio::test]
    async fn export_writes_the_page() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plan.html");
        let goal = GeneratedImage {
            bytes: vec![1, 2, 3],
            mime_type: "image/png".to_string(),
        };
        export_plan(&path, &sample(), Tier::Premium, Some(&goal))
            .await
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("<!DOCTYPE html>"));
        assert!(written.contains("Your 30-Day Transformation Plan"));
        assert!(written.contains("src=\"data:image/png;base64,AQID\""));
    }
}
