//! Create poll table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Poll::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Poll::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Poll::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Poll::Description).text())
                    .col(ColumnDef::new(Poll::CreatorId).string_len(64).not_null())
                    .col(ColumnDef::new(Poll::Options).json().not_null())
                    .col(ColumnDef::new(Poll::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Poll::EndDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(Poll::VotersCount).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Poll::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Poll::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: creator_id (for "my polls")
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_creator_id")
                    .table(Poll::Table)
                    .col(Poll::CreatorId)
                    .to_owned(),
            )
            .await?;

        // Index: (is_active, created_at) for the public listings
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_is_active_created_at")
                    .table(Poll::Table)
                    .col(Poll::IsActive)
                    .col(Poll::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Poll::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Poll {
    Table,
    Id,
    Title,
    Description,
    CreatorId,
    Options,
    IsActive,
    EndDate,
    VotersCount,
    CreatedAt,
    UpdatedAt,
}
