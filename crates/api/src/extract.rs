//! Request extractors: identity, role and validated bodies.
//!
//! Identity comes from an upstream auth gateway as trusted headers; these
//! extractors only read them.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use checkout::{Customer, Viewer};
use common::UserId;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const ADMIN_ROLE: &str = "admin";

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub is_admin: bool,
}

impl CurrentUser {
    pub fn customer(&self) -> Customer {
        Customer {
            id: self.id,
            email: self.email.clone(),
        }
    }

    /// Admins see every order; everyone else sees their own.
    pub fn viewer(&self) -> Viewer {
        if self.is_admin {
            Viewer::Admin
        } else {
            Viewer::Customer(self.id)
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let raw_id = header(parts, USER_ID_HEADER).ok_or_else(|| {
            tracing::debug!(uri = %parts.uri, "request without user identity");
            ApiError::Unauthorized("Not authorized, no user".to_string())
        })?;
        let id = UserId::parse(raw_id)
            .map_err(|_| ApiError::Unauthorized("Not authorized, invalid user".to_string()))?;

        let user = CurrentUser {
            id,
            email: header(parts, USER_EMAIL_HEADER).unwrap_or_default().to_string(),
            is_admin: header(parts, USER_ROLE_HEADER)
                .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE)),
        };

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.id, uri = %parts.uri, "admin route denied");
            return Err(ApiError::Forbidden("Not authorized as an admin".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// Request bodies that check their own invariants after decoding.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// JSON body that has been decoded and validated.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        value.validate().map_err(ApiError::BadRequest)?;
        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = HttpRequest::builder().uri("/api/v1/orders");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_current_user_from_headers() {
        let id = UserId::new();
        let raw_id = id.to_string();
        let mut parts = parts(&[
            (USER_ID_HEADER, raw_id.as_str()),
            (USER_EMAIL_HEADER, "buyer@example.com"),
        ]);

        let user = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "buyer@example.com");
        assert!(!user.is_admin);
        assert_eq!(user.viewer(), Viewer::Customer(id));
    }

    #[tokio::test]
    async fn test_missing_or_invalid_identity_is_unauthorized() {
        let mut empty = parts(&[]);
        let result = CurrentUser::from_request_parts(&mut empty, &()).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));

        let mut garbage = parts(&[(USER_ID_HEADER, "not-a-uuid")]);
        let result = CurrentUser::from_request_parts(&mut garbage, &()).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_admin_role() {
        let id = UserId::new().to_string();

        let mut admin = parts(&[(USER_ID_HEADER, id.as_str()), (USER_ROLE_HEADER, "Admin")]);
        let AdminUser(user) = AdminUser::from_request_parts(&mut admin, &()).await.unwrap();
        assert_eq!(user.viewer(), Viewer::Admin);

        let mut customer = parts(&[(USER_ID_HEADER, id.as_str()), (USER_ROLE_HEADER, "user")]);
        let result = AdminUser::from_request_parts(&mut customer, &()).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }
}
