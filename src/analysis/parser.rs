//! Splits the model's free-form report into its five numbered sections.
//!
//! The model is instructed to echo each header verbatim. Sections are located
//! by literal search, so a response that drops or rewords a header yields an
//! empty section instead of an error. [`AnalysisResult::missing_sections`]
//! lets callers notice that case.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Section {
    Summary,
    Opportunities,
    VisualDescription,
    Plan,
    Closing,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Summary,
        Section::Opportunities,
        Section::VisualDescription,
        Section::Plan,
        Section::Closing,
    ];

    /// Header text the model must emit before this section.
    pub fn header(self) -> &'static str {
        match self {
            Section::Summary => "1. Photo Analysis Summary",
            Section::Opportunities => "2. Key Enhancement Opportunities",
            Section::VisualDescription => "3. AI-Enhanced Beauty Goal Description",
            Section::Plan => "4. Personalized Transformation Plan",
            Section::Closing => "5. Motivational Closing",
        }
    }

    pub fn title(self) -> &'static str {
        // Header without the leading "N. ".
        &self.header()[3..]
    }

    fn next(self) -> Option<Section> {
        match self {
            Section::Summary => Some(Section::Opportunities),
            Section::Opportunities => Some(Section::VisualDescription),
            Section::VisualDescription => Some(Section::Plan),
            Section::Plan => Some(Section::Closing),
            Section::Closing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub opportunities: String,
    pub visual_description: String,
    pub plan: String,
    pub closing: String,
    pub raw_text: String,
}

impl AnalysisResult {
    pub fn section(&self, section: Section) -> &str {
        match section {
            Section::Summary => &self.summary,
            Section::Opportunities => &self.opportunities,
            Section::VisualDescription => &self.visual_description,
            Section::Plan => &self.plan,
            Section::Closing => &self.closing,
        }
    }

    /// Sections whose header does not appear in the raw text.
    pub fn missing_sections(&self) -> Vec<Section> {
        Section::ALL
            .into_iter()
            .filter(|section| !self.raw_text.contains(section.header()))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_sections().is_empty()
    }
}

fn extract_section<'a>(text: &'a str, start_marker: &str, end_marker: Option<&str>) -> &'a str {
    let Some(start_index) = text.find(start_marker) else {
        return "";
    };
    let content_start = start_index + start_marker.len();
    let rest = &text[content_start..];

    let content = match end_marker.and_then(|marker| rest.find(marker)) {
        Some(end_index) => &rest[..end_index],
        None => rest,
    };
    content.trim()
}

pub fn parse_analysis(text: &str) -> AnalysisResult {
    let extract = |section: Section| -> String {
        extract_section(
            text,
            section.header(),
            section.next().map(Section::header),
        )
        .to_string()
    };

    AnalysisResult {
        summary: extract(Section::Summary),
        opportunities: extract(Section::Opportunities),
        visual_description: extract(Section::VisualDescription),
        plan: extract(Section::Plan),
        closing: extract(Section::Closing),
        raw_text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_REPORT: &str = "Here is your report.\n\n\
1. Photo Analysis Summary\n\
Oval face with balanced proportions.\n\n\
2. Key Enhancement Opportunities\n\
- You can enhance skin hydration\n\
- You may benefit from brow shaping\n\n\
3. AI-Enhanced Beauty Goal Description\n\
Radiant skin, defined brows, soft warm lighting.\n\n\
4. Personalized Transformation Plan\n\
## Skin\n\
- Morning: cleanser, SPF 50\n\n\
5. Motivational Closing\n\
You are improving every day.\n";

    #[test]
    fn extracts_all_five_sections_trimmed() {
        let result = parse_analysis(FULL_REPORT);
        assert_eq!(result.summary, "Oval face with balanced proportions.");
        assert_eq!(
            result.opportunities,
            "- You can enhance skin hydration\n- You may benefit from brow shaping"
        );
        assert_eq!(
            result.visual_description,
            "Radiant skin, defined brows, soft warm lighting."
        );
        assert_eq!(result.plan, "## Skin\n- Morning: cleanser, SPF 50");
        assert_eq!(result.closing, "You are improving every day.");
        assert_eq!(result.raw_text, FULL_REPORT);
        assert!(result.is_complete());
    }

    #[test]
    fn missing_header_leaves_that_section_empty() {
        let text = FULL_REPORT.replace("3. AI-Enhanced Beauty Goal Description", "3. Goal");
        let result = parse_analysis(&text);

        assert_eq!(result.visual_description, "");
        // Section 2 has no end marker, so it runs to the end of the text.
        assert!(result.opportunities.starts_with("- You can enhance"));
        assert!(result.opportunities.ends_with("You are improving every day."));
        assert_eq!(result.plan, "## Skin\n- Morning: cleanser, SPF 50");
        assert_eq!(result.missing_sections(), vec![Section::VisualDescription]);
    }

    #[test]
    fn missing_closing_keeps_plan_to_end_of_text() {
        let text = FULL_REPORT.replace("5. Motivational Closing\n", "");
        let result = parse_analysis(&text);
        assert_eq!(result.closing, "");
        assert_eq!(
            result.plan,
            "## Skin\n- Morning: cleanser, SPF 50\n\nYou are improving every day."
        );
    }

    #[test]
    fn unstructured_text_yields_empty_sections() {
        let result = parse_analysis("Sorry, I can't help with that.");
        for section in Section::ALL {
            assert_eq!(result.section(section), "");
        }
        assert_eq!(result.missing_sections().len(), 5);
        assert_eq!(parse_analysis("").missing_sections().len(), 5);
    }

    #[test]
    fn end_marker_is_searched_after_the_start() {
        // A stray mention of the next header before the section must not cut it.
        let text = "Note: 2. Key Enhancement Opportunities follows.\n\
1. Photo Analysis Summary\nBright eyes.\n2. Key Enhancement Opportunities\nSleep more.";
        let result = parse_analysis(text);
        assert_eq!(result.summary, "Bright eyes.");
    }

    #[test]
    fn section_titles_drop_the_number() {
        assert_eq!(Section::Summary.title(), "Photo Analysis Summary");
        assert_eq!(Section::Closing.title(), "Motivational Closing");
    }
}
