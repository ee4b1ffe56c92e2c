//! Request authentication for the Coordinator Facade (§9).
//!
//! Two credentials exist in this system, not one session/login layer:
//! workers authenticate heartbeats with the chain key their stake is
//! registered under (§4.5); administrators authenticate with a static key
//! over `X-Admin-Key`. Both are `FromRequestParts<AppState>` extractors in
//! the same shape the inherited JWT `AuthUser` extractor used.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use ciro_common::error::AppError;

use crate::state::AppState;

/// Extractor guarding administrative routes (e.g. unban). The key is
/// compared against `AppConfig::admin_api_key`; there is no per-admin
/// identity, matching the system's lack of a user-account model.
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let provided = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let expected = state.config.admin_api_key.clone();

        async move {
            match provided {
                Some(key) if key == expected => Ok(AdminAuth),
                _ => Err(AppError::Input(
                    "missing or invalid X-Admin-Key header".to_string(),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, Request};

    #[test]
    fn admin_key_header_name_is_case_insensitive_per_http_spec() {
        let req = Request::builder()
            .header("X-Admin-Key", "secret")
            .body(())
            .unwrap();
        assert_eq!(
            req.headers().get("x-admin-key"),
            Some(&HeaderValue::from_static("secret"))
        );
    }
}
