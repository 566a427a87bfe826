//! Subscription to pledge linkage.
//!
//! Every gift of a subscription points at one destination pledge. The first
//! synced payment opens the pledge and records it in the `pledge_map` table;
//! renewals read the mapping and make no destination call.
//!
//! The unique index on `pledge_map.subscription_id` is the only concurrency
//! guard. When two attempts race for the same subscription, both may open a
//! pledge on the destination, but only one insert lands. The loser re-reads
//! the stored row and uses that pledge, leaving its own pledge unreferenced.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use thiserror::Error;
use uuid::Uuid;

use crate::destination::{DestinationClient, DestinationError, DestinationId, PledgePayload};
use crate::entity::pledge_map::{ActiveModel, Column, Entity as PledgeMap, Model};

/// Errors from linking a subscription to a pledge.
#[derive(Debug, Error)]
pub enum PledgeError {
    /// Creating the pledge on the destination failed.
    #[error("Pledge creation failed: {0}")]
    Destination(#[from] DestinationError),

    /// Reading or writing the mapping failed.
    #[error("Pledge map error: {0}")]
    Store(#[from] DbErr),

    /// The mapping was neither inserted nor found afterwards.
    #[error("Pledge mapping for subscription {subscription_id} vanished after insert")]
    MissingAfterInsert { subscription_id: String },
}

impl PledgeError {
    /// Whether the failure was a destination transport problem.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Destination(e) if e.is_transport())
    }
}

pub type Result<T> = std::result::Result<T, PledgeError>;

/// How a subscription payment got its pledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PledgeLink {
    /// A mapping already existed.
    Reused { pledge_id: DestinationId },
    /// This call opened the pledge.
    Created { pledge_id: DestinationId },
}

impl PledgeLink {
    pub fn pledge_id(self) -> DestinationId {
        match self {
            Self::Reused { pledge_id } | Self::Created { pledge_id } => pledge_id,
        }
    }

    pub fn created(self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// What linking would do, without doing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PledgePlan {
    Reuse { pledge_id: DestinationId },
    Create,
}

// ─── Mapping store ───────────────────────────────────────────────────────────

/// Handle to the `pledge_map` table.
#[derive(Debug, Clone)]
pub struct PledgeMapStore {
    db: Arc<DatabaseConnection>,
}

impl PledgeMapStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Look up the mapping for a subscription.
    pub async fn find(&self, subscription_id: &str) -> std::result::Result<Option<Model>, DbErr> {
        PledgeMap::find()
            .filter(Column::SubscriptionId.eq(subscription_id))
            .one(self.db.as_ref())
            .await
    }

    /// Record a mapping unless one exists, then return the stored row.
    ///
    /// The returned row is the winner: if another writer got there first its
    /// pledge id is returned, not `dest_pledge_id`.
    pub async fn insert_if_absent(
        &self,
        subscription_id: &str,
        dest_pledge_id: DestinationId,
        dest_donor_id: DestinationId,
    ) -> Result<Model> {
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            subscription_id: Set(subscription_id.to_string()),
            dest_pledge_id: Set(dest_pledge_id),
            dest_donor_id: Set(dest_donor_id),
            created_at: Set(Utc::now().fixed_offset()),
        };

        PledgeMap::insert(model)
            .on_conflict(
                OnConflict::column(Column::SubscriptionId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        self.find(subscription_id)
            .await?
            .ok_or_else(|| PledgeError::MissingAfterInsert {
                subscription_id: subscription_id.to_string(),
            })
    }

    /// Number of mapped subscriptions.
    pub async fn count(&self) -> std::result::Result<u64, DbErr> {
        PledgeMap::find().count(self.db.as_ref()).await
    }

    /// All mappings, oldest first.
    pub async fn all(&self) -> std::result::Result<Vec<Model>, DbErr> {
        use sea_orm::QueryOrder;

        PledgeMap::find()
            .order_by_asc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await
    }
}

// ─── Linker ──────────────────────────────────────────────────────────────────

/// Resolves a subscription to its destination pledge, creating it once.
#[derive(Debug, Clone)]
pub struct PledgeLinker {
    store: PledgeMapStore,
}

impl PledgeLinker {
    pub fn new(store: PledgeMapStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &PledgeMapStore {
        &self.store
    }

    /// Read-only: would this subscription reuse a pledge or open one?
    pub async fn plan(&self, subscription_id: &str) -> Result<PledgePlan> {
        Ok(match self.store.find(subscription_id).await? {
            Some(mapping) => PledgePlan::Reuse {
                pledge_id: mapping.dest_pledge_id,
            },
            None => PledgePlan::Create,
        })
    }

    /// Return the subscription's pledge, opening it on the destination if no
    /// mapping exists yet.
    pub async fn link<D: DestinationClient + ?Sized>(
        &self,
        destination: &D,
        subscription_id: &str,
        pledge: &PledgePayload,
    ) -> Result<PledgeLink> {
        if let Some(mapping) = self.store.find(subscription_id).await? {
            return Ok(PledgeLink::Reused {
                pledge_id: mapping.dest_pledge_id,
            });
        }

        let created_id = destination.create_pledge(pledge).await?;
        let stored = self
            .store
            .insert_if_absent(subscription_id, created_id, pledge.donor_id)
            .await?;

        if stored.dest_pledge_id != created_id {
            tracing::warn!(
                subscription_id,
                kept_pledge_id = stored.dest_pledge_id,
                orphaned_pledge_id = created_id,
                "Lost pledge creation race; destination pledge left unreferenced"
            );
            return Ok(PledgeLink::Reused {
                pledge_id: stored.dest_pledge_id,
            });
        }

        tracing::info!(
            subscription_id,
            pledge_id = created_id,
            donor_id = pledge.donor_id,
            "Opened pledge for subscription"
        );
        Ok(PledgeLink::Created {
            pledge_id: created_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pledge_link_accessors() {
        let created = PledgeLink::Created { pledge_id: 5 };
        let reused = PledgeLink::Reused { pledge_id: 5 };
        assert_eq!(created.pledge_id(), 5);
        assert!(created.created());
        assert!(!reused.created());
    }

    #[test]
    fn only_destination_transport_errors_are_transport() {
        assert!(PledgeError::from(DestinationError::network("reset")).is_transport());
        assert!(!PledgeError::from(DestinationError::api("bad code")).is_transport());
        assert!(!PledgeError::from(DbErr::Custom("x".into())).is_transport());
    }
}
