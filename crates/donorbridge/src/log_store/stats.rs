use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;

use crate::entity::donation_type::DonationType;
use crate::entity::donor_action::DonorAction;
use crate::entity::sync_log::{Column, Entity as SyncLog};
use crate::entity::sync_status::SyncStatus;

use super::errors::Result;

/// Dashboard counters, all derived from the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub success: u64,
    pub error: u64,
    pub skipped: u64,
    /// Successful attempts that created a new destination donor.
    pub donors_created: u64,
    /// Successful attempts that reused an existing destination donor.
    pub donors_matched: u64,
    /// Distinct pledges opened by the engine.
    pub pledges_created: u64,
    pub recurring_gifts: u64,
    pub onetime_gifts: u64,
    /// Time of the most recent successful attempt.
    pub last_sync: Option<DateTimeWithTimeZone>,
}

/// Successful gifts of one donation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeBreakdown {
    pub donation_type: DonationType,
    pub count: u64,
    pub total_amount: Decimal,
}

/// Successful gifts whose amount falls into one range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmountBucket {
    pub label: &'static str,
    pub count: u64,
}

/// Successful gifts on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
    pub total_amount: Decimal,
}

/// Chart series for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartData {
    pub types: Vec<TypeBreakdown>,
    pub amount_buckets: Vec<AmountBucket>,
    pub timeline: Vec<DailyCount>,
}

/// Upper bounds in cents (exclusive) and labels. The last bucket is open.
const AMOUNT_BUCKETS: [(i64, &str); 5] = [
    (2_500, "<25"),
    (10_000, "25-99"),
    (50_000, "100-499"),
    (100_000, "500-999"),
    (i64::MAX, "1000+"),
];

fn bucket_index(amount_cents: i64) -> usize {
    AMOUNT_BUCKETS
        .iter()
        .position(|(upper, _)| amount_cents < *upper)
        .unwrap_or(AMOUNT_BUCKETS.len() - 1)
}

async fn count_where(
    db: &DatabaseConnection,
    status: SyncStatus,
    extra: Option<sea_orm::sea_query::SimpleExpr>,
) -> Result<u64> {
    let mut select = SyncLog::find().filter(Column::Status.eq(status));
    if let Some(expr) = extra {
        select = select.filter(expr);
    }
    Ok(select.count(db).await?)
}

pub(super) async fn stats(db: &DatabaseConnection) -> Result<SyncStats> {
    let success = count_where(db, SyncStatus::Success, None).await?;
    let error = count_where(db, SyncStatus::Error, None).await?;
    let skipped = count_where(db, SyncStatus::Skipped, None).await?;

    let donors_created = count_where(
        db,
        SyncStatus::Success,
        Some(Column::DonorAction.eq(DonorAction::Created)),
    )
    .await?;
    let donors_matched = count_where(
        db,
        SyncStatus::Success,
        Some(Column::DonorAction.eq(DonorAction::Matched)),
    )
    .await?;
    let onetime_gifts = count_where(
        db,
        SyncStatus::Success,
        Some(Column::DonationType.eq(DonationType::Single)),
    )
    .await?;
    let recurring_gifts = success - onetime_gifts;

    let pledges_created = SyncLog::find()
        .filter(Column::PledgeCreated.eq(true))
        .filter(Column::DestPledgeId.is_not_null())
        .all(db)
        .await?
        .into_iter()
        .filter_map(|entry| entry.dest_pledge_id)
        .collect::<BTreeSet<_>>()
        .len() as u64;

    let last_sync = SyncLog::find()
        .filter(Column::Status.eq(SyncStatus::Success))
        .order_by_desc(Column::Id)
        .one(db)
        .await?
        .map(|entry| entry.created_at);

    Ok(SyncStats {
        success,
        error,
        skipped,
        donors_created,
        donors_matched,
        pledges_created,
        recurring_gifts,
        onetime_gifts,
        last_sync,
    })
}

pub(super) async fn chart_data(db: &DatabaseConnection) -> Result<ChartData> {
    let successes = SyncLog::find()
        .filter(Column::Status.eq(SyncStatus::Success))
        .order_by_asc(Column::Id)
        .all(db)
        .await?;

    let mut types: BTreeMap<&'static str, TypeBreakdown> = BTreeMap::new();
    let mut buckets = [0u64; AMOUNT_BUCKETS.len()];
    let mut timeline: BTreeMap<NaiveDate, DailyCount> = BTreeMap::new();

    for entry in &successes {
        let amount = entry.amount();

        let by_type = types
            .entry(entry.donation_type.as_str())
            .or_insert_with(|| TypeBreakdown {
                donation_type: entry.donation_type,
                count: 0,
                total_amount: Decimal::ZERO,
            });
        by_type.count += 1;
        by_type.total_amount += amount;

        buckets[bucket_index(entry.amount_cents)] += 1;

        let date = entry.created_at.date_naive();
        let day = timeline.entry(date).or_insert_with(|| DailyCount {
            date,
            count: 0,
            total_amount: Decimal::ZERO,
        });
        day.count += 1;
        day.total_amount += amount;
    }

    Ok(ChartData {
        types: types.into_values().collect(),
        amount_buckets: AMOUNT_BUCKETS
            .iter()
            .zip(buckets)
            .map(|(&(_, label), count)| AmountBucket { label, count })
            .collect(),
        timeline: timeline.into_values().collect(),
    })
}


#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod db_tests {
    use super::*;
    use crate::connect_and_migrate;
    use crate::log_store::query::{NewLogEntry, append};

    fn success(
        donation_id: i64,
        donation_type: DonationType,
        amount_cents: i64,
        donor_action: DonorAction,
    ) -> NewLogEntry {
        NewLogEntry {
            donor_action: Some(donor_action),
            dest_donor_id: Some(100),
            dest_gift_id: Some(1000 + donation_id),
            ..NewLogEntry::new(donation_id, donation_type, amount_cents, SyncStatus::Success)
        }
    }

    #[tokio::test]
    async fn stats_aggregate_the_whole_log() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();

        append(&db, success(1, DonationType::Single, 2500, DonorAction::Created))
            .await
            .unwrap();
        append(
            &db,
            NewLogEntry {
                dest_pledge_id: Some(77),
                pledge_created: true,
                ..success(2, DonationType::SubscriptionInitial, 1000, DonorAction::Created)
            },
        )
        .await
        .unwrap();
        append(
            &db,
            NewLogEntry {
                dest_pledge_id: Some(77),
                ..success(3, DonationType::Renewal, 1000, DonorAction::Matched)
            },
        )
        .await
        .unwrap();
        append(
            &db,
            NewLogEntry::new(4, DonationType::Single, 500, SyncStatus::Error).with_error("boom"),
        )
        .await
        .unwrap();
        append(
            &db,
            NewLogEntry::new(5, DonationType::Single, 0, SyncStatus::Skipped),
        )
        .await
        .unwrap();

        let stats = stats(&db).await.unwrap();
        assert_eq!(stats.success, 3);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.donors_created, 2);
        assert_eq!(stats.donors_matched, 1);
        assert_eq!(stats.pledges_created, 1);
        assert_eq!(stats.onetime_gifts, 1);
        assert_eq!(stats.recurring_gifts, 2);
        assert!(stats.last_sync.is_some());
    }

    #[tokio::test]
    async fn chart_data_groups_successes() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();

        append(&db, success(1, DonationType::Single, 2500, DonorAction::Created))
            .await
            .unwrap();
        append(&db, success(2, DonationType::Single, 150_000, DonorAction::Matched))
            .await
            .unwrap();
        append(&db, success(3, DonationType::Renewal, 1000, DonorAction::Matched))
            .await
            .unwrap();
        append(
            &db,
            NewLogEntry::new(4, DonationType::Single, 999_999, SyncStatus::Error),
        )
        .await
        .unwrap();

        let chart = chart_data(&db).await.unwrap();

        let single = chart
            .types
            .iter()
            .find(|t| t.donation_type == DonationType::Single)
            .expect("single breakdown");
        assert_eq!(single.count, 2);
        assert_eq!(single.total_amount, Decimal::new(152_500, 2));

        let counts: Vec<u64> = chart.amount_buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1, 0, 0, 1]);

        assert_eq!(chart.timeline.len(), 1);
        assert_eq!(chart.timeline[0].count, 3);
    }
}
