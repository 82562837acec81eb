use std::sync::Arc;

use poem::Endpoint;
use poem::Middleware;
use poem::Request;
use poem::Result as PoemResult;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::errors::HttpError;
use crate::domain::ManagerError;

/// Requires `Authorization: Bearer <secret>` on every request when a secret
/// is configured. Without one, requests pass through untouched.
pub struct SecretAuthMiddleware {
    secret: Option<Arc<str>>,
}

impl SecretAuthMiddleware {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }
}

impl<E> Middleware<E> for SecretAuthMiddleware
where E: Endpoint
{
    type Output = SecretAuthEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        SecretAuthEndpoint {
            inner: ep,
            secret: self.secret.clone(),
        }
    }
}

pub struct SecretAuthEndpoint<E> {
    inner: E,
    secret: Option<Arc<str>>,
}

/// Constant time for equal-length inputs
fn secret_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

impl<E> Endpoint for SecretAuthEndpoint<E>
where E: Endpoint
{
    type Output = E::Output;

    async fn call(&self, req: Request) -> PoemResult<Self::Output> {
        let Some(secret) = &self.secret else {
            return self.inner.call(req).await;
        };

        let presented = req
            .headers()
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        let Some(token) = presented else {
            debug!(uri = %req.uri(), "Rejected request without bearer secret");
            return Err(HttpError::from(ManagerError::Unauthorized).into());
        };
        if !secret_matches(token, secret) {
            debug!(uri = %req.uri(), "Rejected request with invalid secret");
            return Err(HttpError::from(ManagerError::Unauthorized).into());
        }

        self.inner.call(req).await
    }
}
