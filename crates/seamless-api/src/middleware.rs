use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use seamless_types::api::Claims;

use crate::AppState;

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = decode_token(&state.jwt_secret, token).ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Shared with the gateway upgrade, which carries the token in the query string.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode, get_current_timestamp};
    use uuid::Uuid;

    use super::*;

    fn token(secret: &str, sub: Uuid, exp: u64) -> String {
        let claims = Claims {
            sub,
            exp: exp as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_subject() {
        let user = Uuid::new_v4();
        let t = token("s3cret", user, get_current_timestamp() + 3600);
        assert_eq!(decode_token("s3cret", &t).map(|c| c.sub), Some(user));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let t = token("s3cret", Uuid::new_v4(), get_current_timestamp() + 3600);
        assert!(decode_token("other", &t).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let t = token("s3cret", Uuid::new_v4(), get_current_timestamp() - 3600);
        assert!(decode_token("s3cret", &t).is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_token("s3cret", "not.a.jwt").is_none());
    }
}
