use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::error::Error;
use crate::database::schema::{Id, User};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(24)).timestamp();

        Self {
            user_id: id,
            username,
            iat,
            exp,
        }
    }
}

/// The authenticated identity carried through request handling.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username,
        }
    }
}

fn session_key() -> Hmac<Sha256> {
    let secret = std::env::var("SESSION_SECRET").unwrap_or_else(|_| String::from("secret"));
    // HMAC-SHA256 accepts keys of any length.
    Hmac::new_from_slice(secret.as_bytes()).unwrap()
}

pub fn generate_jwt_session(user: &User) -> String {
    let claims = JwtSessionData::new(user.id, user.username.to_owned());

    claims.sign_with_key(&session_key()).unwrap()
}

pub fn verify_jwt_session(token: String) -> Result<JwtSessionData, Error> {
    token
        .verify_with_key(&session_key())
        .map_err(|_| Error::Unauthorized(String::from("Invalid session; Invalid token")))
        .map(|session: JwtSessionData| {
            let now = Local::now().timestamp();

            if (session.exp - now).is_negative() {
                return Err(Error::Unauthorized(String::from(
                    "Invalid session; Token expired",
                )));
            }
            Ok(session)
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Remy"),
            last_name: String::from("Gusteau"),
            password: String::from("<hash>"),
        }
    }

    #[test]
    fn sign_then_verify_round_trip() {
        let token = generate_jwt_session(&user());
        let session = verify_jwt_session(token).unwrap();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "cook");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let mut token = generate_jwt_session(&user());
        token.push('x');
        assert!(matches!(
            verify_jwt_session(token),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn session_data_keeps_the_identity() {
        let claims = JwtSessionData::new(7, String::from("cook"));
        let session = SessionData::from(claims);
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "cook");
    }
}
