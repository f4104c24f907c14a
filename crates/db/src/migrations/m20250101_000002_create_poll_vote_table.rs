//! Create poll vote (ledger) table migration.

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_poll_table::Poll;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PollVote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollVote::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollVote::PollId).string_len(32).not_null())
                    .col(ColumnDef::new(PollVote::VoterId).string_len(64).not_null())
                    .col(ColumnDef::new(PollVote::OptionId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(PollVote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_vote_poll")
                            .from(PollVote::Table, PollVote::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: one ledger row per voter per poll
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_vote_poll_id_voter_id")
                    .table(PollVote::Table)
                    .col(PollVote::PollId)
                    .col(PollVote::VoterId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: voter_id (for "polls I voted on")
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_vote_voter_id")
                    .table(PollVote::Table)
                    .col(PollVote::VoterId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PollVote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PollVote {
    Table,
    Id,
    PollId,
    VoterId,
    OptionId,
    CreatedAt,
}
