use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Color, Table,
};

use crate::harness::SampleReport;
use crate::lifecycle::LifecycleStatus;

/// Longest error excerpt shown in the summary table
const MAX_ERROR_LEN: usize = 120;

fn status_cell(status: LifecycleStatus) -> Cell {
    let color = match status {
        LifecycleStatus::Passed => Color::Green,
        LifecycleStatus::Failed => Color::Red,
        _ => Color::Yellow,
    };
    Cell::new(status.to_string()).fg(color)
}

/// First line of an error, shortened for the table
fn error_excerpt(error: &str) -> String {
    let first_line = error.lines().next().unwrap_or_default();
    if first_line.chars().count() > MAX_ERROR_LEN {
        let cut: String = first_line.chars().take(MAX_ERROR_LEN - 1).collect();
        format!("{}…", cut)
    } else {
        first_line.to_string()
    }
}

/// Build the summary table for a harness run
pub fn summary_table(reports: &[SampleReport]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("SAMPLE").add_attribute(Attribute::Bold),
            Cell::new("SERVICE").add_attribute(Attribute::Bold),
            Cell::new("IMAGE").add_attribute(Attribute::Bold),
            Cell::new("STATUS").add_attribute(Attribute::Bold),
            Cell::new("DURATION").add_attribute(Attribute::Bold),
            Cell::new("URL").add_attribute(Attribute::Bold),
            Cell::new("ERROR").add_attribute(Attribute::Bold),
        ]);

    for report in reports {
        table.add_row(vec![
            Cell::new(&report.dir),
            Cell::new(&report.service),
            Cell::new(&report.image),
            status_cell(report.status),
            Cell::new(format!("{:.0?}", report.duration)),
            Cell::new(report.url.as_deref().unwrap_or("-")),
            Cell::new(
                report
                    .error
                    .as_deref()
                    .map(error_excerpt)
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    table
}

/// Print the summary and a one-line verdict
pub fn print_summary(reports: &[SampleReport]) {
    if reports.is_empty() {
        println!("No samples were run");
        return;
    }

    println!("{}", summary_table(reports));

    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed == 0 {
        println!("✓ All {} sample(s) passed", reports.len());
    } else {
        println!("✗ {} of {} sample(s) failed", failed, reports.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(status: LifecycleStatus, error: Option<&str>) -> SampleReport {
        SampleReport {
            dir: "/src/run/hello".to_string(),
            service: "src-run-hello-abc123".to_string(),
            image: "gcr.io/p/src-run-hello:1".to_string(),
            status,
            url: None,
            error: error.map(str::to_string),
            duration: Duration::from_secs(42),
        }
    }

    #[test]
    fn test_error_excerpt() {
        assert_eq!(error_excerpt("first\nsecond"), "first");
        let long = "x".repeat(500);
        let excerpt = error_excerpt(&long);
        assert_eq!(excerpt.chars().count(), MAX_ERROR_LEN);
        assert!(excerpt.ends_with('…'));
    }

    #[test]
    fn test_summary_table_has_row_per_report() {
        let reports = vec![
            report(LifecycleStatus::Passed, None),
            report(LifecycleStatus::Failed, Some("build failed\nstderr")),
        ];

        let rendered = summary_table(&reports).to_string();

        assert!(rendered.contains("SERVICE"));
        assert!(rendered.contains("Passed"));
        assert!(rendered.contains("Failed"));
        assert!(rendered.contains("build failed"));
        assert!(!rendered.contains("stderr"));
        assert!(rendered.contains("42s"));
    }
}
