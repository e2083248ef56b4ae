//! Access-token issuance, lookup, and revocation.
//!
//! Tokens are opaque bearer credentials: 48 bytes of OS randomness encoded
//! as URL-safe base64, tied to one owning user and valid for a fixed window
//! from issuance. Validity is enforced where tokens are read, so nothing
//! here ever needs a background sweep, and a token that is expired, revoked,
//! or simply made up produces the same empty answer everywhere.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::entity::{access_token, user};
use crate::error::Result;

/// Random bytes behind each token value; encodes to 64 characters.
const TOKEN_BYTES: usize = 48;

/// Issues and manages long-lived access tokens.
#[derive(Debug, Clone)]
pub struct TokenStore {
    conn: DatabaseConnection,
    validity: Duration,
}

impl TokenStore {
    pub fn new(conn: DatabaseConnection, validity: Duration) -> Self {
        Self { conn, validity }
    }

    /// Mints a token for `owner_id` and persists it in one transaction.
    ///
    /// The returned model carries the generated id and the full token value;
    /// `expires_at` is stamped `created_at` plus the configured validity.
    pub async fn issue(&self, owner_id: &str) -> Result<access_token::Model> {
        let now = Utc::now();

        let txn = self.conn.begin().await?;
        let model = access_token::ActiveModel {
            token: Set(generate_token_value()),
            user_id: Set(owner_id.to_string()),
            created_at: Set(now),
            expires_at: Set(now + self.validity),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        tracing::info!(token_id = model.id, "access token issued");
        Ok(model)
    }

    /// Exact-match lookup filtered by `expires_at > now` in the same query.
    /// Expired and nonexistent values are both `None`.
    pub async fn find_valid(
        &self,
        token_value: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<access_token::Model>> {
        let found = access_token::Entity::find()
            .filter(access_token::Column::Token.eq(token_value))
            .filter(access_token::Column::ExpiresAt.gt(now))
            .one(&self.conn)
            .await?;
        Ok(found)
    }

    /// Resolves a presented token value to its owning user. Redemption does
    /// not consume the token; it stays valid until expiry or revocation.
    pub async fn redeem(
        &self,
        token_value: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<user::Model>> {
        let found = access_token::Entity::find()
            .filter(access_token::Column::Token.eq(token_value))
            .filter(access_token::Column::ExpiresAt.gt(now))
            .find_also_related(user::Entity)
            .one(&self.conn)
            .await?;
        Ok(found.and_then(|(_, owner)| owner))
    }

    /// All of an owner's tokens, newest first. Expired tokens are included;
    /// the owner sees them until they revoke them.
    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<access_token::Model>> {
        let tokens = access_token::Entity::find()
            .filter(access_token::Column::UserId.eq(owner_id))
            .order_by_desc(access_token::Column::CreatedAt)
            .all(&self.conn)
            .await?;
        Ok(tokens)
    }

    /// Deletes the token if it exists and belongs to `owner_id`, in a single
    /// statement. A foreign or unknown id deletes nothing and returns
    /// `false`; the caller cannot tell those cases apart.
    pub async fn revoke(&self, token_id: i32, owner_id: &str) -> Result<bool> {
        let res = access_token::Entity::delete_many()
            .filter(access_token::Column::Id.eq(token_id))
            .filter(access_token::Column::UserId.eq(owner_id))
            .exec(&self.conn)
            .await?;

        let deleted = res.rows_affected > 0;
        if deleted {
            tracing::info!(token_id, "access token revoked");
        }
        Ok(deleted)
    }
}

/// 48 bytes from the OS CSPRNG as unpadded URL-safe base64: standard base64
/// with `+` as `-`, `/` as `_`, and no `=` padding. Safe to carry in a query
/// string without escaping.
fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use sea_orm::{ConnectOptions, Database};
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::migration::Migrator;

    async fn setup() -> (DatabaseConnection, TokenStore) {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1);
        let conn = Database::connect(opt).await.unwrap();
        Migrator::up(&conn, None).await.unwrap();
        let store = TokenStore::new(conn.clone(), Duration::days(365));
        (conn, store)
    }

    async fn seed_user(conn: &DatabaseConnection, id: &str) {
        user::ActiveModel {
            id: Set(id.to_string()),
            email: Set(format!("{id}@example.com")),
            display_name: Set(Some(id.to_string())),
            password_hash: Set("unused".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .unwrap();
    }

    async fn insert_token(
        conn: &DatabaseConnection,
        owner: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> access_token::Model {
        access_token::ActiveModel {
            token: Set(generate_token_value()),
            user_id: Set(owner.to_string()),
            created_at: Set(created_at),
            expires_at: Set(expires_at),
            ..Default::default()
        }
        .insert(conn)
        .await
        .unwrap()
    }

    #[test]
    fn token_values_stay_in_the_urlsafe_alphabet() {
        for _ in 0..100 {
            let value = generate_token_value();
            assert_eq!(value.len(), 64);
            assert!(value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            assert!(!value.contains('+'));
            assert!(!value.contains('/'));
            assert!(!value.contains('='));
        }
    }

    #[test]
    fn token_values_do_not_repeat() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_token_value()));
        }
    }

    #[tokio::test]
    async fn issue_stamps_the_validity_window() {
        let (conn, store) = setup().await;
        seed_user(&conn, "u1").await;

        let token = store.issue("u1").await.unwrap();

        assert_eq!(token.expires_at - token.created_at, Duration::days(365));
        assert_eq!(token.user_id, "u1");
    }

    #[tokio::test]
    async fn issued_tokens_are_immediately_redeemable() {
        let (conn, store) = setup().await;
        seed_user(&conn, "u1").await;

        let token = store.issue("u1").await.unwrap();

        let found = store.find_valid(&token.token, Utc::now()).await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(token.id));

        let owner = store.redeem(&token.token, Utc::now()).await.unwrap();
        assert_eq!(owner.map(|u| u.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn expired_and_unknown_tokens_are_indistinguishable() {
        let (conn, store) = setup().await;
        seed_user(&conn, "u1").await;
        let now = Utc::now();

        let expired = insert_token(&conn, "u1", now - Duration::days(400), now - Duration::days(35)).await;

        let for_expired = store.find_valid(&expired.token, now).await.unwrap();
        let for_unknown = store.find_valid("no-such-token", now).await.unwrap();
        assert_eq!(for_expired, for_unknown);
        assert!(for_expired.is_none());

        assert!(store.redeem(&expired.token, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expiry_is_evaluated_against_the_supplied_clock() {
        let (conn, store) = setup().await;
        seed_user(&conn, "u1").await;

        let token = store.issue("u1").await.unwrap();

        let just_before = token.expires_at - Duration::seconds(1);
        let just_after = token.expires_at + Duration::seconds(1);
        assert!(store.find_valid(&token.token, just_before).await.unwrap().is_some());
        assert!(store.find_valid(&token.token, just_after).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoke_deletes_an_owned_token() {
        let (conn, store) = setup().await;
        seed_user(&conn, "u1").await;
        let token = store.issue("u1").await.unwrap();

        assert!(store.revoke(token.id, "u1").await.unwrap());

        assert!(store.find_valid(&token.token, Utc::now()).await.unwrap().is_none());
        assert!(store.list_for_owner("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn revoking_a_foreign_token_looks_like_a_miss_and_deletes_nothing() {
        let (conn, store) = setup().await;
        seed_user(&conn, "owner").await;
        seed_user(&conn, "intruder").await;
        let token = store.issue("owner").await.unwrap();

        let foreign = store.revoke(token.id, "intruder").await.unwrap();
        let unknown = store.revoke(9999, "intruder").await.unwrap();

        assert_eq!(foreign, unknown);
        assert!(!foreign);
        // Still present and still valid for its owner
        assert!(store.find_valid(&token.token, Utc::now()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let (conn, store) = setup().await;
        seed_user(&conn, "u1").await;
        let base = Utc::now();

        let t1 = insert_token(&conn, "u1", base - Duration::minutes(3), base + Duration::days(1)).await;
        let t2 = insert_token(&conn, "u1", base - Duration::minutes(2), base + Duration::days(1)).await;
        let t3 = insert_token(&conn, "u1", base - Duration::minutes(1), base + Duration::days(1)).await;

        let listed: Vec<i32> = store
            .list_for_owner("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(listed, vec![t3.id, t2.id, t1.id]);
    }

    #[tokio::test]
    async fn listing_for_a_tokenless_owner_is_empty() {
        let (conn, store) = setup().await;
        seed_user(&conn, "u1").await;

        assert!(store.list_for_owner("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn redemption_does_not_consume_the_token() {
        let (conn, store) = setup().await;
        seed_user(&conn, "u1").await;
        let token = store.issue("u1").await.unwrap();

        for _ in 0..3 {
            let owner = store.redeem(&token.token, Utc::now()).await.unwrap();
            assert!(owner.is_some());
        }
    }
}
