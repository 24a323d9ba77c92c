//! One-shot notices carried across a redirect in the `notice` cookie.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

const COOKIE_NAME: &str = "notice";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, text)
    }

    fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    fn decode(raw: &str) -> Option<Self> {
        let bytes = general_purpose::URL_SAFE_NO_PAD.decode(raw).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

fn read_cookie(headers: &HeaderMap) -> Option<Notice> {
    let cookie = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie
        .split(';')
        .filter_map(|pair| pair.trim().strip_prefix("notice="))
        .find_map(Notice::decode)
}

/// Appends a `Set-Cookie` header. Values built here are always valid header text.
pub fn append_cookie(response: &mut Response, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
}

/// 303 to `to`, leaving `notice` for the next page.
pub fn redirect_with(to: &str, notice: Notice) -> Response {
    let mut response = redirect(to);
    append_cookie(
        &mut response,
        &format!(
            "{COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax",
            notice.encode()
        ),
    );
    response
}

pub fn redirect(to: &str) -> Response {
    let mut response = StatusCode::SEE_OTHER.into_response();
    if let Ok(location) = HeaderValue::from_str(to) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

/// The pending notice, if any. Consumed by `Flash::page`.
#[derive(Debug, Default)]
pub struct Flash(pub Option<Notice>);

#[async_trait]
impl<S> FromRequestParts<S> for Flash
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Flash(read_cookie(&parts.headers)))
    }
}

impl Flash {
    pub fn page<T: Serialize>(self, data: T) -> Page<T> {
        Page {
            consumed: self.0.is_some(),
            notice: self.0,
            data,
        }
    }
}

/// JSON body of a GET page: the data a template would render plus the notice.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub notice: Option<Notice>,
    pub data: T,
    #[serde(skip)]
    consumed: bool,
}

impl<T> Page<T> {
    /// Replaces the notice shown with this page.
    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }
}

impl<T: Serialize> IntoResponse for Page<T> {
    fn into_response(self) -> Response {
        let consumed = self.consumed;
        let mut response = Json(self).into_response();
        if consumed {
            append_cookie(&mut response, "notice=; Path=/; Max-Age=0");
        }
        response
    }
}
