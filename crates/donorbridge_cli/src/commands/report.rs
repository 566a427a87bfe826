use donorbridge::sync::{MatchAction, MatchReport, MatchReportRow};
use serde::Serialize;
use tabled::Tabled;

use super::shared::{Access, Context, OutputFormat, or_dash, print_json, print_rows};

#[derive(Debug, Serialize, Tabled)]
struct ReportRow {
    #[tabled(rename = "Donor")]
    source_donor_id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Action")]
    action: MatchAction,
    #[tabled(rename = "DonorPerfect ID")]
    dest_donor_id: String,
    #[tabled(rename = "Note")]
    message: String,
}

impl From<&MatchReportRow> for ReportRow {
    fn from(row: &MatchReportRow) -> Self {
        Self {
            source_donor_id: row.source_donor_id,
            name: row.name.clone(),
            email: row.email.clone(),
            action: row.action,
            dest_donor_id: or_dash(row.dest_donor_id),
            message: row.message.clone().unwrap_or_default(),
        }
    }
}

fn summary_line(report: &MatchReport) -> String {
    let mut line = format!(
        "{} donors: {} match, {} would be created, {} skipped",
        report.total, report.matched, report.new, report.skipped
    );
    if report.errors > 0 {
        line.push_str(&format!(", {} lookups failed", report.errors));
    }
    line
}

/// Compare source donors against DonorPerfect without writing anything.
pub(crate) async fn handle_report(
    ctx: &Context,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = ctx.open_engine(Access::Full).await?;
    let report = engine.match_report().await?;

    match output {
        OutputFormat::Table => {
            if !report.rows.is_empty() {
                print_rows(report.rows.iter().map(ReportRow::from).collect(), output)?;
            }
            println!("{}", summary_line(&report));
        }
        OutputFormat::Json => print_json(&report)?,
    }

    Ok(())
}
