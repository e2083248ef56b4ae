//! Single sign-on: exchanges a bearer access token for a browser session.

use axum::extract::{Query, State};
use axum::response::Redirect;
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{error, info, warn};

use crate::web::{establish_session, AppState, LOGIN_PATH};

#[derive(Debug, Deserialize)]
pub struct RedeemParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// `GET /account/sso?token=...`
///
/// A valid token signs its owner in and lands on the home page. Everything
/// else, whether the token is missing, unknown, expired, or the lookup
/// itself failed, goes back to the login page with no further detail.
pub async fn redeem(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<RedeemParams>,
) -> Redirect {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        return Redirect::to(LOGIN_PATH);
    };

    match state.tokens.redeem(&token, Utc::now()).await {
        Ok(Some(owner)) => {
            if let Err(e) = establish_session(&state.config, &session, &owner.id, false).await {
                warn!(error = %e, "could not establish a session during token redemption");
                return Redirect::to(LOGIN_PATH);
            }
            info!(user_id = %owner.id, "access token redeemed");
            Redirect::to("/")
        }
        Ok(None) => Redirect::to(LOGIN_PATH),
        Err(e) => {
            error!(error = %e, "token redemption failed");
            Redirect::to(LOGIN_PATH)
        }
    }
}
