use donorbridge::log_store::{ChartData, SyncStats};
use donorbridge::sync::BackfillOverview;
use serde::Serialize;
use tabled::Tabled;

use super::shared::{Access, Context, OutputFormat, money, or_dash, print_json, print_rows};
use super::sync::print_overview;

#[derive(Debug, Serialize, Tabled)]
struct StatRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Debug, Serialize, Tabled)]
struct TypeRow {
    #[tabled(rename = "Type")]
    donation_type: String,
    #[tabled(rename = "Gifts")]
    count: u64,
    #[tabled(rename = "Total")]
    total: String,
}

#[derive(Debug, Serialize, Tabled)]
struct BucketRow {
    #[tabled(rename = "Amount")]
    label: &'static str,
    #[tabled(rename = "Gifts")]
    count: u64,
}

#[derive(Debug, Serialize, Tabled)]
struct DayRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Gifts")]
    count: u64,
    #[tabled(rename = "Total")]
    total: String,
}

#[derive(Serialize)]
struct StatsReport<'a> {
    stats: &'a SyncStats,
    charts: &'a ChartData,
    /// Present when a source export is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    backlog: Option<&'a BackfillOverview>,
}

fn stat_rows(stats: &SyncStats) -> Vec<StatRow> {
    let row = |metric, value: u64| StatRow {
        metric,
        value: value.to_string(),
    };
    vec![
        row("Synced", stats.success),
        row("Failed", stats.error),
        row("Skipped", stats.skipped),
        row("Donors created", stats.donors_created),
        row("Donors matched", stats.donors_matched),
        row("Pledges created", stats.pledges_created),
        row("Recurring gifts", stats.recurring_gifts),
        row("One-time gifts", stats.onetime_gifts),
        StatRow {
            metric: "Last sync",
            value: or_dash(
                stats
                    .last_sync
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
        },
    ]
}

/// Show sync counters and the chart series behind them.
pub(crate) async fn handle_stats(
    ctx: &Context,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = ctx.open_engine(Access::LogOnly).await?;
    let stats = engine.get_stats().await?;
    let charts = engine.get_chart_data().await?;
    let backlog = if ctx.has_source() {
        Some(engine.backfill_overview().await?)
    } else {
        None
    };

    if output == OutputFormat::Json {
        print_json(&StatsReport {
            stats: &stats,
            charts: &charts,
            backlog: backlog.as_ref(),
        })?;
        return Ok(());
    }

    print_rows(stat_rows(&stats), output)?;

    if let Some(backlog) = &backlog {
        println!("\nBacklog:");
        print_overview(backlog)?;
    }

    if !charts.types.is_empty() {
        println!("\nBy type:");
        let rows = charts
            .types
            .iter()
            .map(|t| TypeRow {
                donation_type: t.donation_type.to_string(),
                count: t.count,
                total: money(t.total_amount),
            })
            .collect();
        print_rows(rows, output)?;
    }

    if charts.amount_buckets.iter().any(|b| b.count > 0) {
        println!("\nBy amount:");
        let rows = charts
            .amount_buckets
            .iter()
            .map(|b| BucketRow {
                label: b.label,
                count: b.count,
            })
            .collect();
        print_rows(rows, output)?;
    }

    if !charts.timeline.is_empty() {
        println!("\nBy day:");
        let rows = charts
            .timeline
            .iter()
            .map(|d| DayRow {
                date: d.date.to_string(),
                count: d.count,
                total: money(d.total_amount),
            })
            .collect();
        print_rows(rows, output)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_rows_cover_every_counter() {
        let stats = SyncStats {
            success: 10,
            error: 2,
            skipped: 3,
            donors_created: 4,
            donors_matched: 6,
            pledges_created: 1,
            recurring_gifts: 5,
            onetime_gifts: 5,
            last_sync: None,
        };
        let rows = stat_rows(&stats);
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0].value, "10");
        assert_eq!(rows[5].metric, "Pledges created");
        assert_eq!(rows[8].value, "-");
    }

    #[test]
    fn json_report_omits_backlog_without_a_source() {
        let stats = SyncStats::default();
        let charts = ChartData::default();
        let report = StatsReport {
            stats: &stats,
            charts: &charts,
            backlog: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("backlog").is_none());

        let backlog = BackfillOverview {
            completed: 2,
            ..BackfillOverview::default()
        };
        let report = StatsReport {
            backlog: Some(&backlog),
            ..report
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["backlog"]["completed"], 2);
    }
}
