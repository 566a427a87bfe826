use std::collections::BTreeSet;

use chrono::Utc;
use sea_orm::sea_query::{Expr, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Select, Set,
};

use crate::entity::donation_type::DonationType;
use crate::entity::donor_action::DonorAction;
use crate::entity::sync_log::{ActiveModel, Column, Entity as SyncLog, Model};
use crate::entity::sync_status::SyncStatus;
use crate::source::DonationId;

use super::errors::{LogStoreError, Result};

/// Data for a new log entry. The id and timestamp are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub donation_id: DonationId,
    pub donation_type: DonationType,
    pub amount_cents: i64,
    pub donor_action: Option<DonorAction>,
    pub dest_donor_id: Option<i64>,
    pub dest_gift_id: Option<i64>,
    pub dest_pledge_id: Option<i64>,
    pub pledge_created: bool,
    pub status: SyncStatus,
    pub error_message: Option<String>,
}

impl NewLogEntry {
    /// An entry with only the donation fields and a status set.
    pub fn new(
        donation_id: DonationId,
        donation_type: DonationType,
        amount_cents: i64,
        status: SyncStatus,
    ) -> Self {
        Self {
            donation_id,
            donation_type,
            amount_cents,
            donor_action: None,
            dest_donor_id: None,
            dest_gift_id: None,
            dest_pledge_id: None,
            pledge_created: false,
            status,
            error_message: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Filter for log listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub status: Option<SyncStatus>,
    pub donation_type: Option<DonationType>,
    pub donation_id: Option<DonationId>,
}

impl LogFilter {
    pub fn status(status: SyncStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn apply(&self, mut select: Select<SyncLog>) -> Select<SyncLog> {
        if let Some(status) = self.status {
            select = select.filter(Column::Status.eq(status));
        }
        if let Some(donation_type) = self.donation_type {
            select = select.filter(Column::DonationType.eq(donation_type));
        }
        if let Some(donation_id) = self.donation_id {
            select = select.filter(Column::DonationId.eq(donation_id));
        }
        select
    }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

pub(super) async fn append(db: &DatabaseConnection, entry: NewLogEntry) -> Result<Model> {
    let model = ActiveModel {
        id: NotSet,
        donation_id: Set(entry.donation_id),
        donation_type: Set(entry.donation_type),
        amount_cents: Set(entry.amount_cents),
        donor_action: Set(entry.donor_action),
        dest_donor_id: Set(entry.dest_donor_id),
        dest_gift_id: Set(entry.dest_gift_id),
        dest_pledge_id: Set(entry.dest_pledge_id),
        pledge_created: Set(entry.pledge_created),
        status: Set(entry.status),
        error_message: Set(entry.error_message),
        created_at: Set(Utc::now().fixed_offset()),
    };

    model.insert(db).await.map_err(LogStoreError::from)
}

pub(super) async fn clear(db: &DatabaseConnection) -> Result<u64> {
    let result = SyncLog::delete_many().exec(db).await?;
    tracing::warn!(
        removed = result.rows_affected,
        "Sync log cleared; every donation now counts as unsynced and may be sent again"
    );
    Ok(result.rows_affected)
}

// ─── Queries ─────────────────────────────────────────────────────────────────

pub(super) async fn find(
    db: &DatabaseConnection,
    filter: &LogFilter,
    limit: u64,
    offset: u64,
) -> Result<Vec<Model>> {
    filter
        .apply(SyncLog::find())
        .order_by_desc(Column::Id)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await
        .map_err(LogStoreError::from)
}

pub(super) async fn count(db: &DatabaseConnection, filter: &LogFilter) -> Result<u64> {
    filter
        .apply(SyncLog::find())
        .count(db)
        .await
        .map_err(LogStoreError::from)
}

pub(super) async fn history(db: &DatabaseConnection, donation_id: DonationId) -> Result<Vec<Model>> {
    SyncLog::find()
        .filter(Column::DonationId.eq(donation_id))
        .order_by_asc(Column::Id)
        .all(db)
        .await
        .map_err(LogStoreError::from)
}

pub(super) async fn is_synced(db: &DatabaseConnection, donation_id: DonationId) -> Result<bool> {
    let latest = SyncLog::find()
        .filter(Column::DonationId.eq(donation_id))
        .filter(Column::Status.ne(SyncStatus::Skipped))
        .order_by_desc(Column::Id)
        .one(db)
        .await?;

    Ok(latest.is_some_and(|entry| entry.is_success()))
}

/// `SELECT MAX(id) ... GROUP BY donation_id` over outcome rows: the id of
/// each donation's latest success or error entry.
fn latest_outcome_ids() -> SelectStatement {
    SyncLog::find()
        .select_only()
        .expr(Expr::col(Column::Id).max())
        .filter(Column::Status.ne(SyncStatus::Skipped))
        .group_by(Column::DonationId)
        .into_query()
}

pub(super) async fn synced_ids(db: &DatabaseConnection) -> Result<BTreeSet<DonationId>> {
    let ids: Vec<DonationId> = SyncLog::find()
        .select_only()
        .column(Column::DonationId)
        .filter(Column::Id.in_subquery(latest_outcome_ids()))
        .filter(Column::Status.eq(SyncStatus::Success))
        .into_tuple()
        .all(db)
        .await?;

    Ok(ids.into_iter().collect())
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use super::*;
    use crate::connect_and_migrate;

    async fn setup() -> DatabaseConnection {
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("Failed to create test database")
    }

    fn entry(donation_id: DonationId, status: SyncStatus) -> NewLogEntry {
        NewLogEntry::new(donation_id, DonationType::Single, 2500, status)
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let db = setup().await;
        let first = append(&db, entry(1, SyncStatus::Error)).await.unwrap();
        let second = append(&db, entry(1, SyncStatus::Success)).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(history(&db, 1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn latest_outcome_decides_synced_state() {
        let db = setup().await;
        append(&db, entry(1, SyncStatus::Error)).await.unwrap();
        append(&db, entry(1, SyncStatus::Success)).await.unwrap();
        append(&db, entry(2, SyncStatus::Success)).await.unwrap();
        append(&db, entry(2, SyncStatus::Error)).await.unwrap();

        assert!(is_synced(&db, 1).await.unwrap());
        assert!(!is_synced(&db, 2).await.unwrap());
        assert!(!is_synced(&db, 3).await.unwrap());
        assert_eq!(synced_ids(&db).await.unwrap(), BTreeSet::from([1]));
    }

    #[tokio::test]
    async fn skip_entries_do_not_change_synced_state() {
        let db = setup().await;
        append(&db, entry(5, SyncStatus::Success)).await.unwrap();
        append(&db, entry(5, SyncStatus::Skipped).with_error("Already synced"))
            .await
            .unwrap();
        append(&db, entry(6, SyncStatus::Skipped)).await.unwrap();

        assert!(is_synced(&db, 5).await.unwrap());
        assert!(!is_synced(&db, 6).await.unwrap());
        assert_eq!(synced_ids(&db).await.unwrap(), BTreeSet::from([5]));
    }

    #[tokio::test]
    async fn synced_ids_follow_the_latest_outcome_across_many_donations() {
        let db = setup().await;
        for id in 1..=60 {
            append(&db, entry(id, SyncStatus::Error)).await.unwrap();
            append(&db, entry(id, SyncStatus::Success)).await.unwrap();
            if id % 3 == 0 {
                append(&db, entry(id, SyncStatus::Error)).await.unwrap();
            }
            if id % 4 == 0 {
                append(&db, entry(id, SyncStatus::Skipped)).await.unwrap();
            }
        }

        let synced = synced_ids(&db).await.unwrap();
        let expected: BTreeSet<DonationId> = (1..=60).filter(|id| id % 3 != 0).collect();
        assert_eq!(synced, expected);
        assert!(is_synced(&db, 4).await.unwrap());
        assert!(!is_synced(&db, 12).await.unwrap());
    }

    #[tokio::test]
    async fn find_filters_and_pages_newest_first() {
        let db = setup().await;
        for id in 1..=5 {
            append(&db, entry(id, SyncStatus::Success)).await.unwrap();
        }
        append(&db, entry(6, SyncStatus::Error)).await.unwrap();

        let page = find(&db, &LogFilter::status(SyncStatus::Success), 2, 0)
            .await
            .unwrap();
        assert_eq!(
            page.iter().map(|e| e.donation_id).collect::<Vec<_>>(),
            vec![5, 4]
        );

        let page = find(&db, &LogFilter::status(SyncStatus::Success), 2, 4)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].donation_id, 1);

        assert_eq!(count(&db, &LogFilter::default()).await.unwrap(), 6);
        assert_eq!(
            count(&db, &LogFilter::status(SyncStatus::Error)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let db = setup().await;
        append(&db, entry(1, SyncStatus::Success)).await.unwrap();
        append(&db, entry(2, SyncStatus::Success)).await.unwrap();

        assert_eq!(clear(&db).await.unwrap(), 2);
        assert!(synced_ids(&db).await.unwrap().is_empty());
        assert_eq!(count(&db, &LogFilter::default()).await.unwrap(), 0);
    }
}
