//! Poll entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Creating user
    #[sea_orm(indexed)]
    pub creator_id: String,

    /// Options with their tallies (JSON array of `{id, text, voteCount}`)
    #[sea_orm(column_type = "Json")]
    pub options: JsonValue,

    /// Stored activity flag; a passed `end_date` closes the poll regardless
    pub is_active: bool,

    #[sea_orm(nullable)]
    pub end_date: Option<DateTimeWithTimeZone>,

    /// Number of ledger rows for this poll
    pub voters_count: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::poll_vote::Entity")]
    PollVote,
}

impl Related<super::poll_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollVote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
