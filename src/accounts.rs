//! Local account management: registration, credential checks, profile and
//! password updates.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set, SqlErr,
};
use uuid::Uuid;

use crate::entity::user;
use crate::error::{AppError, Result};

/// Store for user accounts.
#[derive(Debug, Clone)]
pub struct UserStore {
    conn: DatabaseConnection,
}

impl UserStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Registers a new account. Emails are trimmed and lowercased before
    /// storage; a duplicate reports [`AppError::EmailTaken`] and writes
    /// nothing. Uniqueness rides the database constraint rather than a
    /// check-then-insert, so two racing registrations cannot both succeed.
    pub async fn create(
        &self,
        email: &str,
        display_name: &str,
        password: &str,
    ) -> Result<user::Model> {
        let insert = user::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            email: Set(email.trim().to_lowercase()),
            display_name: Set(Some(display_name.trim().to_string())),
            password_hash: Set(hash_password(password)?),
            created_at: Set(Utc::now()),
        }
        .insert(&self.conn)
        .await;

        let model = match insert {
            Ok(model) => model,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(AppError::EmailTaken)
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = %model.id, "account created");
        Ok(model)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(&self.conn)
            .await?)
    }

    /// Checks a credential pair. Unknown email and wrong password both come
    /// back as `None`; callers cannot tell which half failed.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<user::Model>> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };
        if verify_password(password, &user.password_hash) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub async fn set_display_name(
        &self,
        user: user::Model,
        display_name: &str,
    ) -> Result<user::Model> {
        let mut active = user.into_active_model();
        active.display_name = Set(Some(display_name.trim().to_string()));
        Ok(active.update(&self.conn).await?)
    }

    /// Replaces the password after verifying the current one. Returns
    /// `false` and writes nothing when the current password does not match.
    pub async fn change_password(
        &self,
        user: &user::Model,
        current: &str,
        new: &str,
    ) -> Result<bool> {
        if !verify_password(current, &user.password_hash) {
            return Ok(false);
        }

        let mut active = user.clone().into_active_model();
        active.password_hash = Set(hash_password(new)?);
        active.update(&self.conn).await?;

        tracing::info!(user_id = %user.id, "password changed");
        Ok(true)
    }
}

/// Hashes with argon2's defaults, salting from the OS RNG. The output is a
/// PHC string carrying algorithm, parameters, and salt alongside the digest.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verifies a password against a stored PHC string. A malformed stored hash
/// counts as a mismatch rather than an error.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
