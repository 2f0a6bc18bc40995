//! Scorecard formatting for terminals, Markdown and JSON.

use std::fmt::Write;

use colored::Colorize;

use crate::domain::{CheckOutcome, CheckRow};
use crate::error::Result;
use crate::orchestrator::Scorecard;
use crate::score::{self, MAX_LEVEL};

/// Presentation switches passed explicitly to the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    /// Emit ANSI colors.
    pub color: bool,
}

impl RenderOptions {
    /// Options with colors enabled.
    pub fn colored() -> Self {
        Self { color: true }
    }

    /// Options without any styling.
    pub fn plain() -> Self {
        Self { color: false }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if !self.color {
            return text.to_string();
        }
        match style {
            Style::Heading => text.bold().to_string(),
            Style::Good => text.green().to_string(),
            Style::Partial => text.yellow().to_string(),
            Style::Bad => text.red().to_string(),
            Style::Muted => text.dimmed().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Heading,
    Good,
    Partial,
    Bad,
    Muted,
}

/// Render a scorecard as terminal text, one line per row.
pub fn render_text(card: &Scorecard, options: &RenderOptions) -> String {
    let mut output = String::new();
    let title = match &card.image {
        Some(image) => format!("YOLO compliance for {} ({image})", card.repo),
        None => format!("YOLO compliance for {}", card.repo),
    };
    let _ = writeln!(output, "{}", options.paint(&title, Style::Heading));
    if card.from_cache {
        let _ = writeln!(output, "{}", options.paint("(cached result)", Style::Muted));
    }
    let _ = writeln!(output);

    let width = card
        .rows
        .iter()
        .map(|row| row.check.len())
        .max()
        .unwrap_or(0);
    for row in &card.rows {
        let _ = writeln!(output, "{}", text_row(row, width, options));
    }

    let persona = score::personality(card.percentage);
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Score: {}/{} ({}%)",
        card.score, card.max, card.percentage
    );
    let _ = writeln!(
        output,
        "Level: {}/{MAX_LEVEL} (highest scoring level observed: {})",
        card.level, card.observed_level
    );
    let _ = writeln!(
        output,
        "Personality: {} ({})",
        options.paint(persona.name, level_style(card.level)),
        persona.tagline
    );
    output
}

fn text_row(row: &CheckRow, width: usize, options: &RenderOptions) -> String {
    match &row.outcome {
        CheckOutcome::Scored { result } => {
            let fraction = format!("{:>2}/{:<2}", result.score, result.max);
            let style = if result.score == 0 {
                Style::Muted
            } else if result.score == result.max {
                Style::Good
            } else {
                Style::Partial
            };
            format!(
                "  {:<width$}  {}  {}",
                row.check,
                options.paint(&fraction, style),
                result.message
            )
        }
        CheckOutcome::Failed { error } => format!(
            "  {:<width$}  {}  {error}",
            row.check,
            options.paint("ERROR", Style::Bad)
        ),
    }
}

fn level_style(level: u32) -> Style {
    if level == 0 {
        Style::Muted
    } else {
        Style::Good
    }
}

/// Render a scorecard as a Markdown document.
pub fn render_markdown(card: &Scorecard) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# YOLO compliance: {}\n", card.repo);
    if let Some(image) = &card.image {
        let _ = writeln!(output, "- Image: `{image}`");
    }
    let persona = score::personality(card.percentage);
    let _ = writeln!(
        output,
        "- Score: {}/{} ({}%)",
        card.score, card.max, card.percentage
    );
    let _ = writeln!(output, "- Level: {}/{MAX_LEVEL}", card.level);
    let _ = writeln!(output, "- Personality: {} ({})", persona.name, persona.tagline);
    if card.from_cache {
        let _ = writeln!(output, "- Served from cache");
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "| Check | Score | Level | Details |");
    let _ = writeln!(output, "| --- | --- | --- | --- |");
    for row in &card.rows {
        match &row.outcome {
            CheckOutcome::Scored { result } => {
                let _ = writeln!(
                    output,
                    "| {} | {}/{} | {} | {} |",
                    row.check,
                    result.score,
                    result.max,
                    result.level,
                    escape_cell(&result.message)
                );
            }
            CheckOutcome::Failed { error } => {
                let _ = writeln!(
                    output,
                    "| {} | error | - | {} |",
                    row.check,
                    escape_cell(error)
                );
            }
        }
    }
    output
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Render a scorecard as pretty JSON.
pub fn render_json(card: &Scorecard) -> Result<String> {
    Ok(serde_json::to_string_pretty(card)?)
}
