//! Access token entity.

use sea_orm::entity::prelude::*;

/// A long-lived bearer token owned by a user.
///
/// Rows are immutable after insertion; the only transitions are issuance and
/// deletion (revocation). Validity is a property of `expires_at` alone and is
/// enforced at query time, so expired rows may linger until revoked.
///
/// # Columns
///
/// | Column      | Type                     | Notes                          |
/// |-------------|--------------------------|--------------------------------|
/// | id          | INTEGER (Primary Key)    | auto-increment                 |
/// | token       | TEXT                     | unique, URL-safe base64 value  |
/// | user_id     | TEXT                     | FK to `users.id`, the owner    |
/// | created_at  | TIMESTAMPTZ              | issuance time                  |
/// | expires_at  | TIMESTAMPTZ              | `created_at` + validity window |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "access_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique, column_type = "Text")]
    pub token: String,
    pub user_id: String,
    pub created_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
