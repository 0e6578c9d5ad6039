use axum::http::HeaderMap;
use notememo_core::sync::{DocumentStore, ACCESS_CODE_HEADER};
use notememo_core::util::format_access_code;

use crate::config::AppConfig;
use crate::error::AppError;

/// User resolved from the request's access code.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Read and normalize the `x-access-code` header
pub fn extract_access_code(headers: &HeaderMap) -> Result<String, AppError> {
    let header = headers
        .get(ACCESS_CODE_HEADER)
        .ok_or_else(|| AppError::unauthorized("Missing x-access-code header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("x-access-code header is not valid UTF-8"))?;

    let code = format_access_code(header);
    if code.is_empty() {
        return Err(AppError::unauthorized("x-access-code must not be empty"));
    }
    Ok(code)
}

/// Check the access code against the allow list and map it to its user
pub async fn authenticate(
    config: &AppConfig,
    store: &DocumentStore,
    headers: &HeaderMap,
) -> Result<AuthenticatedUser, AppError> {
    let code = extract_access_code(headers)?;
    if !config.accepts(&code) {
        return Err(AppError::unauthorized("Access code is not valid"));
    }
    let user_id = store.resolve_user(&code).await?;
    Ok(AuthenticatedUser { user_id })
}
