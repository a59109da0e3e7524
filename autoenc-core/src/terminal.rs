//! Terminal output styling for autoenc.
//!
//! Operator-facing progress is printed through `log::info!` so it reaches both
//! the console and the run log. Styling uses `console`, which drops colours
//! automatically when output is not a terminal or `NO_COLOR` is set.

use console::style;
use log::{info, warn};

/// Width labels are padded to in status lines.
const LABEL_WIDTH: usize = 15;

/// Visual hierarchy levels of the output.
#[derive(Debug, Clone, Copy)]
pub enum OutputLevel {
    /// Main sections (===== SECTION =====)
    Section,
    /// Operations (» Operation)
    Subsection,
    /// Key-value status lines
    Status,
}

impl OutputLevel {
    fn indent(self) -> &'static str {
        match self {
            OutputLevel::Section => "",
            OutputLevel::Subsection => "  ",
            OutputLevel::Status => "      ",
        }
    }
}

/// Print a section header for major workflow phases
pub fn print_section(title: &str) {
    info!("");
    info!("===== {} =====", style(title.to_uppercase()).cyan());
    info!("");
}

/// Print a pipeline step
pub fn print_processing(message: &str) {
    info!("");
    info!(
        "{}» {}",
        OutputLevel::Subsection.indent(),
        style(message).bold()
    );
}

/// Print a key-value status line; `highlight` renders the value in bold green.
pub fn print_status(label: &str, value: &str, highlight: bool) {
    info!("{}", format_status(label, value, highlight));
}

fn format_status(label: &str, value: &str, highlight: bool) -> String {
    let padding = LABEL_WIDTH.saturating_sub(label.chars().count()).max(1);
    let value = if highlight {
        style(value).green().bold().to_string()
    } else {
        value.to_string()
    };
    format!(
        "{}{}:{} {}",
        OutputLevel::Status.indent(),
        label,
        " ".repeat(padding),
        value
    )
}

/// Print a success message
pub fn print_success(message: &str) {
    info!("");
    info!("  {} {}", style("✓").green(), style(message).green());
}

/// Print a non-fatal problem
pub fn print_warning(message: &str) {
    warn!("  {} {}", style("⚠").yellow(), style(message).yellow());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label_padding() {
        console::set_colors_enabled(false);
        assert_eq!(format_status("Quality", "20", false), "      Quality:         20");
        assert_eq!(
            format_status("A very long label", "x", false),
            "      A very long label:  x"
        );
    }
}
