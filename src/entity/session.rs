//! Cookie-session entity.

use sea_orm::entity::prelude::*;

/// A persisted cookie session, as written by
/// [`DbSessionStore`](crate::session_store::DbSessionStore).
///
/// The `id` column holds the string form of `tower_sessions::session::Id`;
/// `data` is the MessagePack-encoded session record. `expiry_date` is
/// duplicated out of the record so the store can filter expired sessions
/// server-side on load and bulk-delete them during cleanup.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    pub data: Vec<u8>,
    pub expiry_date: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
