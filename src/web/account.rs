//! Registration, sign-in, and the settings page (profile + access tokens).

use askama::Template;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Extension, Form};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, warn};

use crate::entity::{access_token, user};
use crate::error::{AppError, Result};
use crate::web::{
    clear_session, establish_session, set_flash, take_flash, AppState, LOGIN_PATH,
};

const DISPLAY_NAME_MAX: usize = 50;
const PASSWORD_MIN: usize = 10;
const PASSWORD_MAX: usize = 255;
// The settings page historically allows longer replacement passwords
const NEW_PASSWORD_MAX: usize = 512;

// -- Forms --

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl SettingsForm {
    /// Any of the password fields being filled in means the user is asking
    /// for a password change.
    fn wants_password_change(&self) -> bool {
        !self.current_password.is_empty()
            || !self.new_password.is_empty()
            || !self.confirm_password.is_empty()
    }
}

// -- Validation --

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// One `@` with something on both sides. Deliverability is the mail
/// server's problem, not the form's.
fn is_plausible_email(value: &str) -> bool {
    let mut parts = value.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    )
}

pub fn validate_login(form: &LoginForm) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !is_plausible_email(&form.email) {
        errors.push(FieldError::new("email", "Enter a valid email address."));
    }
    let len = form.password.chars().count();
    if len < PASSWORD_MIN || len > PASSWORD_MAX {
        errors.push(FieldError::new(
            "password",
            "The password must be between 10 and 255 characters.",
        ));
    }
    errors
}

pub fn validate_registration(form: &RegisterForm) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !is_plausible_email(&form.email) {
        errors.push(FieldError::new("email", "Enter a valid email address."));
    }
    let name = form.display_name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("display_name", "Enter a display name."));
    } else if name.chars().count() > DISPLAY_NAME_MAX {
        errors.push(FieldError::new(
            "display_name",
            "The display name must be 50 characters or fewer.",
        ));
    }
    let len = form.password.chars().count();
    if len < PASSWORD_MIN || len > PASSWORD_MAX {
        errors.push(FieldError::new(
            "password",
            "The password must be between 10 and 255 characters.",
        ));
    } else if form.confirm_password != form.password {
        errors.push(FieldError::new(
            "confirm_password",
            "The passwords do not match.",
        ));
    }
    errors
}

pub fn validate_profile(form: &SettingsForm) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let name = form.display_name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("display_name", "Enter a display name."));
    } else if name.chars().count() > DISPLAY_NAME_MAX {
        errors.push(FieldError::new(
            "display_name",
            "The display name must be 50 characters or fewer.",
        ));
    }

    if form.wants_password_change() {
        if form.current_password.is_empty() {
            errors.push(FieldError::new(
                "current_password",
                "Enter your current password.",
            ));
        }
        let len = form.new_password.chars().count();
        if len < PASSWORD_MIN || len > NEW_PASSWORD_MAX {
            errors.push(FieldError::new(
                "new_password",
                "The new password must be between 10 and 512 characters.",
            ));
        } else if form.confirm_password != form.new_password {
            errors.push(FieldError::new(
                "confirm_password",
                "The new passwords do not match.",
            ));
        }
    }
    errors
}

// -- Templates --

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    email: String,
    errors: Vec<FieldError>,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    email: String,
    display_name: String,
    errors: Vec<FieldError>,
}

#[derive(Template)]
#[template(path = "settings.html")]
struct SettingsTemplate {
    email: String,
    display_name: String,
    flash: Option<String>,
    errors: Vec<FieldError>,
    has_tokens: bool,
    tokens: Vec<TokenRow>,
}

struct TokenRow {
    id: i32,
    value: String,
    sso_url: String,
    created_at: String,
    expires_at: String,
}

fn token_row(token: &access_token::Model) -> TokenRow {
    TokenRow {
        id: token.id,
        value: token.token.clone(),
        sso_url: format!("/account/sso?token={}", token.token),
        created_at: token.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        expires_at: token.expires_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    }
}

fn render_login(email: String, errors: Vec<FieldError>) -> Result<Html<String>> {
    let t = LoginTemplate { email, errors };
    Ok(Html(t.render()?))
}

fn render_register(form: &RegisterForm, errors: Vec<FieldError>) -> Result<Html<String>> {
    let t = RegisterTemplate {
        email: form.email.clone(),
        display_name: form.display_name.clone(),
        errors,
    };
    Ok(Html(t.render()?))
}

fn render_settings(
    email: &str,
    display_name: &str,
    flash: Option<String>,
    errors: Vec<FieldError>,
    tokens: &[access_token::Model],
) -> Result<Html<String>> {
    let rows: Vec<TokenRow> = tokens.iter().map(token_row).collect();
    let t = SettingsTemplate {
        email: email.to_string(),
        display_name: display_name.to_string(),
        flash,
        errors,
        has_tokens: !rows.is_empty(),
        tokens: rows,
    };
    Ok(Html(t.render()?))
}

// -- Handlers --

pub async fn login_page() -> Result<Html<String>> {
    render_login(String::new(), Vec::new())
}

pub async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let errors = validate_login(&form);
    if !errors.is_empty() {
        return Ok(render_login(form.email, errors)?.into_response());
    }

    match state
        .users
        .verify_credentials(&form.email, &form.password)
        .await?
    {
        Some(user) => {
            establish_session(&state.config, &session, &user.id, form.remember_me).await?;
            info!(user_id = %user.id, "user signed in");
            Ok(Redirect::to("/").into_response())
        }
        None => {
            warn!("failed sign-in attempt");
            let errors = vec![FieldError::new("form", "Invalid login attempt.")];
            Ok(render_login(form.email, errors)?.into_response())
        }
    }
}

pub async fn logout(session: Session) -> Result<Redirect> {
    clear_session(&session).await?;
    info!("user signed out");
    Ok(Redirect::to(LOGIN_PATH))
}

pub async fn register_page() -> Result<Html<String>> {
    render_register(
        &RegisterForm {
            email: String::new(),
            display_name: String::new(),
            password: String::new(),
            confirm_password: String::new(),
        },
        Vec::new(),
    )
}

pub async fn register_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    let errors = validate_registration(&form);
    if !errors.is_empty() {
        return Ok(render_register(&form, errors)?.into_response());
    }

    match state
        .users
        .create(&form.email, &form.display_name, &form.password)
        .await
    {
        Ok(user) => {
            establish_session(&state.config, &session, &user.id, false).await?;
            Ok(Redirect::to("/").into_response())
        }
        Err(AppError::EmailTaken) => {
            let errors = vec![FieldError::new(
                "email",
                "That email address is already registered.",
            )];
            Ok(render_register(&form, errors)?.into_response())
        }
        Err(other) => Err(other),
    }
}

pub async fn settings_page(
    State(state): State<AppState>,
    Extension(user): Extension<user::Model>,
    session: Session,
) -> Result<Html<String>> {
    let flash = take_flash(&session).await?;
    let tokens = state.tokens.list_for_owner(&user.id).await?;
    render_settings(
        &user.email,
        user.display_name.as_deref().unwrap_or(""),
        flash,
        Vec::new(),
        &tokens,
    )
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<user::Model>,
    session: Session,
    Form(form): Form<SettingsForm>,
) -> Result<Response> {
    let errors = validate_profile(&form);
    if !errors.is_empty() {
        let tokens = state.tokens.list_for_owner(&user.id).await?;
        return Ok(
            render_settings(&user.email, &form.display_name, None, errors, &tokens)?
                .into_response(),
        );
    }

    // Verify the password change before touching the profile, so a rejected
    // attempt leaves no partial update behind
    if form.wants_password_change() {
        if !state
            .users
            .change_password(&user, &form.current_password, &form.new_password)
            .await?
        {
            let tokens = state.tokens.list_for_owner(&user.id).await?;
            let errors = vec![FieldError::new(
                "current_password",
                "The current password is incorrect.",
            )];
            return Ok(
                render_settings(&user.email, &form.display_name, None, errors, &tokens)?
                    .into_response(),
            );
        }
        state.users.set_display_name(user, &form.display_name).await?;
        set_flash(
            &session,
            "Your profile has been updated and your password has been changed.",
        )
        .await?;
    } else {
        state.users.set_display_name(user, &form.display_name).await?;
        set_flash(&session, "Your profile has been updated.").await?;
    }

    Ok(Redirect::to("/account/settings").into_response())
}

pub async fn generate_token(
    State(state): State<AppState>,
    Extension(user): Extension<user::Model>,
    session: Session,
) -> Result<Redirect> {
    state.tokens.issue(&user.id).await?;
    set_flash(
        &session,
        "A new access token has been issued. It appears at the top of the list.",
    )
    .await?;
    Ok(Redirect::to("/account/settings"))
}

pub async fn revoke_token(
    State(state): State<AppState>,
    Extension(user): Extension<user::Model>,
    session: Session,
    Path(token_id): Path<i32>,
) -> Result<Redirect> {
    if state.tokens.revoke(token_id, &user.id).await? {
        set_flash(&session, "The access token has been revoked.").await?;
    } else {
        set_flash(
            &session,
            "Error: the access token was not found or you do not have permission to revoke it.",
        )
        .await?;
    }
    Ok(Redirect::to("/account/settings"))
}
