use axum::http::HeaderMap;

use crate::errors::AppError;
use crate::models::key::ApiKey;
use crate::store::json::Store;

/// Validate the Authorization header against the key store.
///
/// Returns the full key record so callers can log its display name. A
/// missing header, a malformed scheme, an unknown token, and a revoked token
/// all surface as the same `Unauthorized` — callers (and clients) cannot
/// tell them apart. Recording usage is the forwarder's job, not this one's:
/// rejected attempts must not count.
pub async fn authenticate(headers: &HeaderMap, store: &Store) -> Result<ApiKey, AppError> {
    let token = extract_bearer_token(headers)?;
    store
        .find_active_key(token)
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::Unauthorized)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;
    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_token_from_bearer_scheme() {
        let headers = headers_with_auth("Bearer ks_abc123");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "ks_abc123");
    }

    #[test]
    fn rejects_missing_header_and_wrong_scheme() {
        assert!(matches!(
            extract_bearer_token(&HeaderMap::new()),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            extract_bearer_token(&headers_with_auth("Basic dXNlcjpwYXNz")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            extract_bearer_token(&headers_with_auth("Bearer ")),
            Err(AppError::Unauthorized)
        ));
    }
}
