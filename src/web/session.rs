use crate::db;
use crate::domain::access::Permission;
use crate::domain::models::Role;
use crate::state::SharedState;
use crate::web::error::ActionError;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_HOURS: i64 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: i32,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
}

pub fn sign_session(user_id: i32, key: &[u8]) -> Result<String, SessionError> {
    let exp = Utc::now() + Duration::hours(SESSION_HOURS);
    sign_claims(&SessionClaims { user_id, exp: exp.timestamp() }, key)
}

fn sign_claims(claims: &SessionClaims, key: &[u8]) -> Result<String, SessionError> {
    let payload = format!("{}|{}", claims.user_id, claims.exp);
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::STANDARD.encode(payload.as_bytes()),
        general_purpose::STANDARD.encode(sig)
    ))
}

pub fn verify_session(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(SessionError::Invalid)?;
    let payload_bytes = general_purpose::STANDARD
        .decode(payload_b64)
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::STANDARD
        .decode(sig_b64)
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let (user_id, exp) = payload.split_once('|').ok_or(SessionError::Invalid)?;
    let user_id: i32 = user_id.parse().map_err(|_| SessionError::Invalid)?;
    let exp: i64 = exp.parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims { user_id, exp })
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let cookie = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie
        .split(';')
        .find_map(|pair| pair.trim().strip_prefix("session="))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "session={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{secure_flag}",
        SESSION_HOURS * 3600
    )
}

pub fn cleared_session_cookie() -> &'static str {
    "session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"
}

// ============================================
// Axum extractor for the resolved caller
// ============================================

/// The authenticated user with its typed role, resolved once per request:
/// session → active user → profile → role.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: i32,
    pub username: String,
    pub role: Role,
}

impl Caller {
    pub fn require(&self, permission: Permission) -> Result<(), ActionError> {
        if self.role.allows(permission) {
            return Ok(());
        }
        tracing::warn!(
            "User {} ({:?}) denied {:?}",
            self.user_id,
            self.role,
            permission
        );
        Err(self.forbidden())
    }

    pub fn forbidden(&self) -> ActionError {
        ActionError::Forbidden {
            landing: self.role.landing_path(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = ActionError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared_state = SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or(ActionError::NotLoggedIn)?;

        let claims = verify_session(&token, &shared_state.session_key).map_err(|e| {
            tracing::warn!("Session verification failed: {}", e);
            ActionError::NotLoggedIn
        })?;

        let user = db::find_user_by_id(&shared_state.pool, claims.user_id).await?;
        let Some(user) = user.filter(|u| u.is_active) else {
            return Err(ActionError::NotLoggedIn);
        };

        let Some(profile) = db::find_profile(&shared_state.pool, user.id).await? else {
            tracing::warn!("User {} has no profile", user.id);
            return Err(ActionError::NoProfile);
        };

        let role = Role::try_from(profile.group_id)
            .map_err(|_| ActionError::UnknownRole(profile.group_id))?;

        Ok(Caller {
            user_id: user.id,
            username: user.username,
            role,
        })
    }
}
