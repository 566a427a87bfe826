//! Initial migration: the sync log and the subscription to pledge map.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_sync_log(manager).await?;
        self.create_pledge_map(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PledgeMap::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncLog::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_sync_log(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncLog::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    // Source
                    .col(
                        ColumnDef::new(SyncLog::DonationId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncLog::DonationType).string().not_null())
                    .col(
                        ColumnDef::new(SyncLog::AmountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    // Destination
                    .col(ColumnDef::new(SyncLog::DonorAction).string().null())
                    .col(ColumnDef::new(SyncLog::DestDonorId).big_integer().null())
                    .col(ColumnDef::new(SyncLog::DestGiftId).big_integer().null())
                    .col(ColumnDef::new(SyncLog::DestPledgeId).big_integer().null())
                    .col(
                        ColumnDef::new(SyncLog::PledgeCreated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    // Outcome
                    .col(ColumnDef::new(SyncLog::Status).string().not_null())
                    .col(ColumnDef::new(SyncLog::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(SyncLog::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_log_donation_id")
                    .table(SyncLog::Table)
                    .col(SyncLog::DonationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_log_status")
                    .table(SyncLog::Table)
                    .col(SyncLog::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_pledge_map(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PledgeMap::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PledgeMap::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PledgeMap::SubscriptionId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PledgeMap::DestPledgeId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PledgeMap::DestDonorId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PledgeMap::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One pledge per subscription, enforced by the store itself
        manager
            .create_index(
                Index::create()
                    .name("idx_pledge_map_subscription_id")
                    .table(PledgeMap::Table)
                    .col(PledgeMap::SubscriptionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum SyncLog {
    Table,
    Id,
    DonationId,
    DonationType,
    AmountCents,
    DonorAction,
    DestDonorId,
    DestGiftId,
    DestPledgeId,
    PledgeCreated,
    Status,
    ErrorMessage,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PledgeMap {
    Table,
    Id,
    SubscriptionId,
    DestPledgeId,
    DestDonorId,
    CreatedAt,
}
