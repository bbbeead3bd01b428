/// Current-Actor Provider
///
/// Extracts the authenticated local actor for a request from a bearer
/// token. Token issuance, sessions and password handling live outside
/// this core; only the lookup is performed here.
use crate::{context::AppContext, error::ApError, store::models::User};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

/// The authenticated local actor
#[derive(Debug, Clone)]
pub struct CurrentActor(pub User);

#[async_trait]
impl FromRequestParts<AppContext> for CurrentActor {
    type Rejection = ApError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| ApError::Authentication("missing authorization header".to_string()))?;

        let user = state
            .store
            .user_by_token(&token)
            .await?
            .ok_or_else(|| ApError::Authentication("invalid token".to_string()))?;

        Ok(CurrentActor(user))
    }
}

/// Pull the token out of an `Authorization: Bearer ...` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_tokens_are_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer sekrit"),
        );
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("sekrit"));
    }

    #[test]
    fn non_bearer_headers_yield_nothing() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic am9objpwdw=="),
        );
        assert!(extract_bearer_token(&headers).is_none());
    }
}
