use async_trait::async_trait;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use time::OffsetDateTime;
use tower_sessions::{session::Id, session::Record, session_store, ExpiredDeletion, SessionStore};

use crate::entity::session;

/// Database-backed session store for tower-sessions.
///
/// Persists session records in the `sessions` table through the shared
/// sea-orm connection, so sessions survive restarts and live next to the
/// rest of the application data. Records are serialized with MessagePack;
/// expiry is kept in its own column so loading can filter expired sessions
/// server-side and never hand one back.
///
/// Error mapping follows the store contract: database failures become
/// `session_store::Error::Backend`, serialization failures `Encode`, and
/// deserialization failures `Decode`.
#[derive(Debug, Clone)]
pub struct DbSessionStore {
    conn: DatabaseConnection,
}

impl DbSessionStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

fn backend_err(e: sea_orm::DbErr) -> session_store::Error {
    session_store::Error::Backend(e.to_string())
}

/// tower-sessions hands out `time` timestamps; the schema stores chrono UTC.
/// Out-of-range instants clamp to the far future rather than wrapping into
/// the past, which would silently expire the session.
fn expiry_to_utc(expiry: OffsetDateTime) -> DateTimeUtc {
    chrono::DateTime::from_timestamp(expiry.unix_timestamp(), expiry.nanosecond())
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}

#[async_trait]
impl SessionStore for DbSessionStore {
    /// Inserts a fresh session record, regenerating the id on collision.
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let txn = self.conn.begin().await.map_err(backend_err)?;

        while session::Entity::find_by_id(record.id.to_string())
            .one(&txn)
            .await
            .map_err(backend_err)?
            .is_some()
        {
            record.id = Id::default();
        }

        let data =
            rmp_serde::to_vec(record).map_err(|e| session_store::Error::Encode(e.to_string()))?;

        session::ActiveModel {
            id: Set(record.id.to_string()),
            data: Set(data),
            expiry_date: Set(expiry_to_utc(record.expiry_date)),
        }
        .insert(&txn)
        .await
        .map_err(backend_err)?;

        txn.commit().await.map_err(backend_err)?;

        Ok(())
    }

    /// Upserts the record in a single statement keyed on the session id.
    async fn save(&self, record: &Record) -> session_store::Result<()> {
        let data =
            rmp_serde::to_vec(record).map_err(|e| session_store::Error::Encode(e.to_string()))?;

        let model = session::ActiveModel {
            id: Set(record.id.to_string()),
            data: Set(data),
            expiry_date: Set(expiry_to_utc(record.expiry_date)),
        };

        session::Entity::insert(model)
            .on_conflict(
                OnConflict::column(session::Column::Id)
                    .update_columns([session::Column::Data, session::Column::ExpiryDate])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await
            .map_err(backend_err)?;

        Ok(())
    }

    /// Loads a live session; an expired row is indistinguishable from a
    /// missing one.
    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let now = expiry_to_utc(OffsetDateTime::now_utc());

        let row = session::Entity::find_by_id(session_id.to_string())
            .filter(session::Column::ExpiryDate.gt(now))
            .one(&self.conn)
            .await
            .map_err(backend_err)?;

        row.map(|model| {
            rmp_serde::from_slice(&model.data)
                .map_err(|e| session_store::Error::Decode(e.to_string()))
        })
        .transpose()
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        session::Entity::delete_by_id(session_id.to_string())
            .exec(&self.conn)
            .await
            .map_err(backend_err)?;

        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for DbSessionStore {
    /// Bulk-deletes rows whose expiry has passed. Driven by the periodic
    /// cleanup task spawned at startup.
    async fn delete_expired(&self) -> session_store::Result<()> {
        let now = expiry_to_utc(OffsetDateTime::now_utc());

        session::Entity::delete_many()
            .filter(session::Column::ExpiryDate.lte(now))
            .exec(&self.conn)
            .await
            .map_err(backend_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{ConnectOptions, Database};
    use sea_orm_migration::MigratorTrait;
    use time::Duration;

    use super::*;
    use crate::migration::Migrator;

    async fn store() -> DbSessionStore {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1);
        let conn = Database::connect(opt).await.unwrap();
        Migrator::up(&conn, None).await.unwrap();
        DbSessionStore::new(conn)
    }

    fn record_expiring_in(minutes: i64) -> Record {
        Record {
            id: Id::default(),
            data: Default::default(),
            expiry_date: OffsetDateTime::now_utc() + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn create_then_load_roundtrips() {
        let store = store().await;
        let mut record = record_expiring_in(30);
        record
            .data
            .insert("user_id".to_string(), serde_json::json!("u-1"));

        store.create(&mut record).await.unwrap();

        let loaded = store.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.data, record.data);
    }

    #[tokio::test]
    async fn load_skips_expired_sessions() {
        let store = store().await;
        let mut record = record_expiring_in(-5);

        store.create(&mut record).await.unwrap();

        assert!(store.load(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_updates_an_existing_record() {
        let store = store().await;
        let mut record = record_expiring_in(30);
        store.create(&mut record).await.unwrap();

        record
            .data
            .insert("user_id".to_string(), serde_json::json!("u-2"));
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.data.get("user_id"), Some(&serde_json::json!("u-2")));
    }

    #[tokio::test]
    async fn save_without_prior_create_inserts() {
        let store = store().await;
        let record = record_expiring_in(30);

        store.save(&record).await.unwrap();

        assert!(store.load(&record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes_the_session() {
        let store = store().await;
        let mut record = record_expiring_in(30);
        store.create(&mut record).await.unwrap();

        store.delete(&record.id).await.unwrap();

        assert!(store.load(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_expired_leaves_live_sessions_alone() {
        let store = store().await;
        let mut live = record_expiring_in(30);
        let mut dead = record_expiring_in(-30);
        store.create(&mut live).await.unwrap();
        store.create(&mut dead).await.unwrap();

        store.delete_expired().await.unwrap();

        assert!(store.load(&live.id).await.unwrap().is_some());
        let remaining = session::Entity::find().all(&store.conn).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, live.id.to_string());
    }
}
