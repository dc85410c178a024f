use std::convert::Infallible;

use warp::{reject, Filter, Rejection};

use super::jwt::{verify_jwt_session, SessionData};

/// Requires a valid session cookie; rejects with `Error::Unauthorized`
/// otherwise.
pub fn with_session() -> impl Filter<Extract = (SessionData,), Error = Rejection> + Copy {
    warp::cookie::<String>("session").and_then(|session: String| async move {
        match verify_jwt_session(session) {
            Ok(data) => Ok(SessionData::from(data)),
            Err(e) => Err(reject::custom(e)),
        }
    })
}

/// Extracts the session when a valid cookie is present. A missing or
/// invalid cookie yields `None` instead of a rejection, for endpoints that
/// only personalize their output for authenticated viewers.
pub fn with_possible_session() -> impl Filter<Extract = (Option<SessionData>,), Error = Infallible> + Copy
{
    warp::filters::cookie::optional::<String>("session").map(|session: Option<String>| {
        session.and_then(|token| verify_jwt_session(token).ok().map(SessionData::from))
    })
}

/// Requires a valid session without extracting it.
pub fn with_auth() -> impl Filter<Extract = ((),), Error = Rejection> + Copy {
    warp::cookie::<String>("session").and_then(|session: String| async move {
        match verify_jwt_session(session) {
            Ok(_) => Ok(()),
            Err(e) => Err(reject::custom(e)),
        }
    })
}
