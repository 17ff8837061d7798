use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;

pub mod engine;

pub const X_DOWNLOAD_CONSENT: &str = "X-Download-Consent";
const CONSENT_GRANTED: &str = "granted";

/// Proof that the user agreed to download the model weights.
///
/// Requests must carry `X-Download-Consent: granted`.
#[derive(Debug)]
pub struct ExtractConsent;

#[async_trait]
impl<S> FromRequestParts<S> for ExtractConsent
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, (StatusCode, &'static str)> {
        if let Some(consent) = parts.headers.get(X_DOWNLOAD_CONSENT) {
            let consent = consent
                .to_str()
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid consent header"))?;
            if consent.trim().eq_ignore_ascii_case(CONSENT_GRANTED) {
                Ok(ExtractConsent)
            } else {
                Err((StatusCode::FORBIDDEN, "download consent was not granted"))
            }
        } else {
            Err((
                StatusCode::FORBIDDEN,
                "`X-Download-Consent` header is missing",
            ))
        }
    }
}
