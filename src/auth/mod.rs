//! Credential verification.
//!
//! A bearer token is an HS256 JWT naming the account and its role. It is
//! verified once per request or websocket admission and resolved into a
//! [`Session`] that later authorization checks reuse.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::account::{Account, AccountId, Role};
use crate::models::partner::PartnerId;
use crate::models::vendor::VendorId;
use crate::state::AppState;
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub account_id: AccountId,
    pub role: Role,
    pub vendor_id: Option<VendorId>,
    pub partner_id: Option<PartnerId>,
}

impl Session {
    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "{role} role required, session is {}",
                self.role
            )))
        }
    }

    pub fn require_vendor(&self) -> Result<VendorId, AppError> {
        self.require_role(Role::Vendor)?;
        self.vendor_id
            .ok_or_else(|| AppError::NotFound("vendor profile not found".to_string()))
    }

    pub fn require_partner(&self) -> Result<PartnerId, AppError> {
        self.require_role(Role::Delivery)?;
        self.partner_id
            .ok_or_else(|| AppError::NotFound("partner profile not found".to_string()))
    }
}

pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    token_ttl_hours: i64,
}

impl Authenticator {
    pub fn new(secret: &str, token_ttl_hours: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        // No grace period past `exp`.
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            token_ttl_hours,
        }
    }

    pub fn issue(&self, account: &Account) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = Duration::try_hours(self.token_ttl_hours)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AppError::Internal("token ttl out of range".to_string()))?;
        let claims = Claims {
            sub: account.id.to_string(),
            role: account.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AppError::Internal(format!("failed to sign token: {err}")))
    }

    /// Resolves a presented token into a session against current account state.
    pub fn verify(&self, store: &Store, token: &str) -> Result<Session, AppError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => {
                    AppError::Unauthenticated("token expired".to_string())
                }
                _ => AppError::Unauthenticated("invalid token".to_string()),
            })?
            .claims;

        let account_id: AccountId = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthenticated("malformed token subject".to_string()))?;

        let account = store
            .account(account_id)
            .ok_or_else(|| AppError::Unauthenticated("account not found".to_string()))?;

        if !account.active {
            return Err(AppError::Unauthenticated("account inactive".to_string()));
        }
        if account.role != claims.role {
            return Err(AppError::Unauthenticated("token role mismatch".to_string()));
        }

        Ok(Session {
            account_id,
            role: account.role,
            vendor_id: store.vendor_for_account(account_id),
            partner_id: store.partner_for_account(account_id),
        })
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthenticated("missing bearer token".to_string()))?;

        state.authenticator.verify(&state.store, token)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::{Authenticator, Claims, bearer_token};
    use crate::error::AppError;
    use crate::models::account::Role;
    use crate::models::partner::VehicleType;
    use crate::store::{NewAccount, Store};

    const SECRET: &str = "unit-test-secret-that-is-long-enough";

    fn setup(role: Role) -> (Store, Authenticator, crate::models::account::Account) {
        let store = Store::new();
        let account = store
            .insert_account(
                NewAccount {
                    email: "someone@example.com".to_string(),
                    name: "Someone".to_string(),
                    role,
                },
                Utc::now(),
            )
            .unwrap();
        (store, Authenticator::new(SECRET, 1), account)
    }

    fn forge(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn issued_token_resolves_to_session_with_profile() {
        let (store, auth, account) = setup(Role::Delivery);
        let partner = store
            .insert_partner(account.id, VehicleType::Motorcycle, Utc::now())
            .unwrap();

        let token = auth.issue(&account).unwrap();
        let session = auth.verify(&store, &token).unwrap();

        assert_eq!(session.account_id, account.id);
        assert_eq!(session.role, Role::Delivery);
        assert_eq!(session.partner_id, Some(partner.id));
        assert_eq!(session.vendor_id, None);
    }

    #[test]
    fn expired_token_is_unauthenticated() {
        let (store, auth, account) = setup(Role::Customer);
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: account.id.to_string(),
            role: Role::Customer,
            iat: now - 7200,
            exp: now - 3600,
        };

        let result = auth.verify(&store, &forge(&claims, SECRET));

        assert_eq!(
            result,
            Err(AppError::Unauthenticated("token expired".to_string()))
        );
    }

    #[test]
    fn recently_expired_token_is_unauthenticated() {
        let (store, auth, account) = setup(Role::Customer);
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: account.id.to_string(),
            role: Role::Customer,
            iat: now - 3600,
            exp: now - 5,
        };

        let result = auth.verify(&store, &forge(&claims, SECRET));

        assert_eq!(
            result,
            Err(AppError::Unauthenticated("token expired".to_string()))
        );
    }

    #[test]
    fn out_of_range_ttl_fails_to_issue() {
        let (_store, _, account) = setup(Role::Customer);
        let auth = Authenticator::new(SECRET, i64::MAX);

        assert!(matches!(auth.issue(&account), Err(AppError::Internal(_))));
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let (store, auth, account) = setup(Role::Customer);
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: account.id.to_string(),
            role: Role::Customer,
            iat: now,
            exp: now + 3600,
        };

        let result = auth.verify(&store, &forge(&claims, "some-other-secret-entirely-different"));

        assert!(matches!(result, Err(AppError::Unauthenticated(_))));
    }

    #[test]
    fn malformed_token_is_rejected() {
        let (store, auth, _) = setup(Role::Customer);
        assert!(matches!(
            auth.verify(&store, "not-a-jwt"),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn inactive_account_is_rejected() {
        let (store, auth, account) = setup(Role::Vendor);
        let token = auth.issue(&account).unwrap();
        store.set_account_active(account.id, false);

        assert_eq!(
            auth.verify(&store, &token),
            Err(AppError::Unauthenticated("account inactive".to_string()))
        );
    }

    #[test]
    fn claimed_role_must_match_account() {
        let (store, auth, account) = setup(Role::Customer);
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: account.id.to_string(),
            role: Role::Vendor,
            iat: now,
            exp: now + 3600,
        };

        assert!(matches!(
            auth.verify(&store, &forge(&claims, SECRET)),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
