use std::sync::Arc;

use axum::{Extension, extract::Request, http::header, middleware::Next, response::Response};

use crate::{
    app_error::AppError,
    auth::{CurrentUser, Role, token::TokenService},
};

fn bearer_token(req: &Request) -> Result<&str, AppError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    value.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)
}

/// Validates the bearer token and, when a role is required, demands an exact
/// match. Admin tokens get no pass on seller or buyer routes; admin-only
/// surfaces are separate routes behind their own guard. On success the
/// identity is inserted into the request extensions for handlers to pick up.
fn authorize(
    tokens: &TokenService,
    req: &mut Request,
    required_role: Option<Role>,
) -> Result<CurrentUser, AppError> {
    let claims = tokens.validate(bearer_token(req)?)?;
    if let Some(required) = required_role {
        if claims.role != required {
            return Err(AppError::Forbidden(format!(
                "This action requires the {required} role"
            )));
        }
    }
    let user = CurrentUser {
        id: claims.sub,
        role: claims.role,
    };
    req.extensions_mut().insert(user);
    Ok(user)
}

/// Requires any valid token, regardless of role.
pub async fn users_authorization(
    Extension(tokens): Extension<Arc<TokenService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&tokens, &mut req, None)?;
    Ok(next.run(req).await)
}

pub async fn buyers_authorization(
    Extension(tokens): Extension<Arc<TokenService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&tokens, &mut req, Some(Role::Buyer))?;
    Ok(next.run(req).await)
}

pub async fn sellers_authorization(
    Extension(tokens): Extension<Arc<TokenService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&tokens, &mut req, Some(Role::Seller))?;
    Ok(next.run(req).await)
}

pub async fn admins_authorization(
    Extension(tokens): Extension<Arc<TokenService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&tokens, &mut req, Some(Role::Admin))?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use uuid::Uuid;

    use super::*;

    fn service() -> TokenService {
        TokenService::new("middleware-test-secret", 24)
    }

    fn request_with_header(value: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let mut req = request_with_header(None);
        let result = authorize(&service(), &mut req, None);
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[test]
    fn non_bearer_header_is_unauthorized() {
        let mut req = request_with_header(Some("Basic dXNlcjpwYXNz"));
        let result = authorize(&service(), &mut req, None);
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[test]
    fn garbage_bearer_token_is_invalid() {
        let mut req = request_with_header(Some("Bearer definitely-not-a-jwt"));
        let result = authorize(&service(), &mut req, None);
        assert!(matches!(result, Err(AppError::InvalidToken)));
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let tokens = service();
        let token = tokens.issue(Uuid::new_v4(), Role::Buyer).unwrap();
        let mut req = request_with_header(Some(&format!("Bearer {token}")));
        let result = authorize(&tokens, &mut req, Some(Role::Seller));
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn admin_gets_no_override_on_buyer_routes() {
        let tokens = service();
        let token = tokens.issue(Uuid::new_v4(), Role::Admin).unwrap();
        let mut req = request_with_header(Some(&format!("Bearer {token}")));
        let result = authorize(&tokens, &mut req, Some(Role::Buyer));
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn matching_role_inserts_the_identity() {
        let tokens = service();
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id, Role::Seller).unwrap();
        let mut req = request_with_header(Some(&format!("Bearer {token}")));

        let user = authorize(&tokens, &mut req, Some(Role::Seller)).unwrap();

        assert_eq!(user.id, user_id);
        assert_eq!(user.role, Role::Seller);
        assert_eq!(req.extensions().get::<CurrentUser>(), Some(&user));
    }

    #[test]
    fn any_role_passes_when_none_is_required() {
        let tokens = service();
        for role in [Role::Admin, Role::Seller, Role::Buyer] {
            let token = tokens.issue(Uuid::new_v4(), role).unwrap();
            let mut req = request_with_header(Some(&format!("Bearer {token}")));
            assert!(authorize(&tokens, &mut req, None).is_ok());
        }
    }
}
