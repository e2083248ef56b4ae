//! HTTP layer: router, authentication gate, and session helpers.
//!
//! Every route outside [`PUBLIC_PATHS`] requires a signed-in session; the
//! gate middleware resolves the session to a full user row and stashes it in
//! request extensions so handlers get it from an `Extension` extractor.

pub mod account;
pub mod sso;

use askama::Template;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use time::Duration as TimeDuration;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, Session, SessionManagerLayer};

use crate::accounts::UserStore;
use crate::config::Config;
use crate::entity::user;
use crate::error::Result;
use crate::session_store::DbSessionStore;
use crate::tokens::TokenStore;

/// Where unauthenticated requests get sent.
pub const LOGIN_PATH: &str = "/account/login";

const SESSION_COOKIE_NAME: &str = "vestibule_session";
const SESSION_USER_KEY: &str = "user_id";
const SESSION_REMEMBER_KEY: &str = "remember_me";
const SESSION_FLASH_KEY: &str = "flash";

/// Paths reachable without a signed-in session.
const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/account/login",
    "/account/register",
    "/account/sso",
];

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|p| path == *p)
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: UserStore,
    pub tokens: TokenStore,
}

/// Builds the full application: routes, the authentication gate, and the
/// session layer over `session_store`.
pub fn app(state: AppState, session_store: DbSessionStore) -> Router {
    let session_layer = SessionManagerLayer::new(session_store)
        .with_name(SESSION_COOKIE_NAME)
        .with_same_site(SameSite::Lax)
        .with_secure(state.config.cookie_secure)
        .with_expiry(Expiry::OnInactivity(TimeDuration::minutes(
            state.config.session_idle_minutes,
        )));

    router(state).layer(session_layer)
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route(
            "/account/login",
            get(account::login_page).post(account::login_submit),
        )
        .route("/account/logout", get(account::logout))
        .route(
            "/account/register",
            get(account::register_page).post(account::register_submit),
        )
        .route("/account/sso", get(sso::redeem))
        .route(
            "/account/settings",
            get(account::settings_page).post(account::update_profile),
        )
        .route("/account/settings/token", post(account::generate_token))
        .route(
            "/account/settings/token/{id}/revoke",
            post(account::revoke_token),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_login))
        .with_state(state)
}

/// Gate middleware. Public paths pass through untouched; everything else
/// needs a session that resolves to an existing user.
async fn require_login(
    State(state): State<AppState>,
    session: Session,
    mut req: Request,
    next: Next,
) -> Response {
    if is_public_path(req.uri().path()) {
        return next.run(req).await;
    }

    match current_user(&state, &session).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Ok(None) => Redirect::to(LOGIN_PATH).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Resolves the session to a user row. A cookie pointing at a deleted
/// account is flushed and treated as signed out.
///
/// Remembered sessions get their extended expiry re-applied here on every
/// request. The `set_expiry` override lives only on the request-scoped
/// session, so without this a later session write would fall back to the
/// layer default and shrink the window; re-applying it also keeps the
/// 30-day window sliding.
async fn current_user(state: &AppState, session: &Session) -> Result<Option<user::Model>> {
    let Some(user_id) = session.get::<String>(SESSION_USER_KEY).await? else {
        return Ok(None);
    };

    match state.users.find_by_id(&user_id).await? {
        Some(user) => {
            if session.get::<bool>(SESSION_REMEMBER_KEY).await? == Some(true) {
                session.set_expiry(Some(Expiry::OnInactivity(TimeDuration::days(
                    state.config.remember_me_days,
                ))));
            }
            Ok(Some(user))
        }
        None => {
            session.flush().await?;
            Ok(None)
        }
    }
}

/// Signs `user_id` into the session: the id is cycled first, then the
/// expiry is widened for "remember me" sign-ins before the user id lands in
/// the session. The remember-me choice is stored in the session data so
/// [`current_user`] can re-apply the extended expiry on later requests.
pub async fn establish_session(
    config: &Config,
    session: &Session,
    user_id: &str,
    persistent: bool,
) -> Result<()> {
    session.cycle_id().await?;
    if persistent {
        session.set_expiry(Some(Expiry::OnInactivity(TimeDuration::days(
            config.remember_me_days,
        ))));
        session.insert(SESSION_REMEMBER_KEY, true).await?;
    }
    session.insert(SESSION_USER_KEY, user_id).await?;
    Ok(())
}

/// Drops all session state, cookie included.
pub async fn clear_session(session: &Session) -> Result<()> {
    session.flush().await?;
    Ok(())
}

/// Stores a one-shot status message for the next page render.
pub async fn set_flash(session: &Session, message: &str) -> Result<()> {
    session.insert(SESSION_FLASH_KEY, message).await?;
    Ok(())
}

/// Takes the pending status message, leaving none behind.
pub async fn take_flash(session: &Session) -> Result<Option<String>> {
    Ok(session.remove::<String>(SESSION_FLASH_KEY).await?)
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    display_name: String,
    email: String,
}

async fn home(Extension(user): Extension<user::Model>) -> Result<Html<String>> {
    let t = HomeTemplate {
        display_name: user.display_name.unwrap_or_else(|| user.email.clone()),
        email: user.email,
    };
    Ok(Html(t.render()?))
}

async fn health() -> &'static str {
    "ok"
}


#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use sea_orm::EntityTrait;
    use tower::ServiceExt;

    use super::testing::{location, session_cookie, test_app};
    use super::*;

    #[test]
    fn public_paths_are_exact_matches() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/account/login"));
        assert!(is_public_path("/account/sso"));
        assert!(!is_public_path("/"));
        assert!(!is_public_path("/account/settings"));
        assert!(!is_public_path("/account/settings/token"));
    }

    #[tokio::test]
    async fn health_needs_no_session() {
        let (app, _, _) = test_app().await;
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn anonymous_requests_bounce_to_login() {
        let (app, _, _) = test_app().await;

        for path in ["/", "/account/settings"] {
            let res = app
                .clone()
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::SEE_OTHER, "path {path}");
            assert_eq!(location(&res), LOGIN_PATH);
        }
    }

    #[tokio::test]
    async fn home_greets_the_signed_in_user() {
        let (app, state, _) = test_app().await;
        state
            .users
            .create("casey@example.com", "Casey", "password-of-ten")
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/account/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(
                        "email=casey@example.com&password=password-of-ten",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let cookie = session_cookie(&res);

        let res = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("Casey"));
        assert!(body.contains("casey@example.com"));
    }

    #[tokio::test]
    async fn a_session_for_a_deleted_user_is_discarded() {
        let (app, state, conn) = test_app().await;
        let user = state
            .users
            .create("casey@example.com", "Casey", "password-of-ten")
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/account/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(
                        "email=casey@example.com&password=password-of-ten",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let cookie = session_cookie(&res);

        user::Entity::delete_by_id(user.id.clone())
            .exec(&conn)
            .await
            .unwrap();

        let res = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), LOGIN_PATH);
    }
}
