use std::convert::Infallible;

use serde::Serialize;
use warp::{http::StatusCode, reject::Rejection, reply::Reply};

/// Request-scoped failure taxonomy. Every variant maps to a status code and
/// a structured JSON body; none of them is fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotInCollection(String),
    #[error("{0}")]
    Protected(String),
    #[error("{0}")]
    Ownership(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotInCollection(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Ownership(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Protected(_) => StatusCode::CONFLICT,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Conflict(_) => "conflict",
            Error::NotFound(_) => "not_found",
            Error::NotInCollection(_) => "not_in_collection",
            Error::Protected(_) => "protected",
            Error::Ownership(_) => "ownership",
            Error::Unauthorized(_) => "unauthorized",
            Error::Internal(_) => "internal",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            detail: self.to_string(),
        }
    }
}

impl warp::reject::Reject for Error {}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub detail: String,
}

/// Recovery handler for routes built on top of this crate.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(error) = err.find::<Error>() {
        (error.status(), error.body())
    } else if err.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            ErrorBody {
                kind: "not_found",
                detail: String::from("Resource not found"),
            },
        )
    } else {
        log::error!("unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody {
                kind: "internal",
                detail: String::from("Unhandled error"),
            },
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
const PG_CHECK_VIOLATION: &str = "23514";

pub struct QueryError {
    info: String,
    code: Option<String>,
    constraint: Option<String>,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            info,
            code: None,
            constraint: None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(PG_UNIQUE_VIOLATION)
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.code.as_deref() == Some(PG_FOREIGN_KEY_VIOLATION)
    }

    pub fn is_check_violation(&self) -> bool {
        self.code.as_deref() == Some(PG_CHECK_VIOLATION)
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Database(e) => Self {
                info: format!("{e}"),
                code: e.code().map(|c| c.to_string()),
                constraint: e.constraint().map(|c| c.to_string()),
            },
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(format!("RowNotFound")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("{e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::AnyDriverError(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(format!("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(format!("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            _ => Self::new(format!("Unknown error")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        // The unique constraint arbitrates concurrent identical writes;
        // application-level existence checks are advisory only.
        if value.is_unique_violation() {
            return Error::Conflict(match value.constraint.as_deref() {
                Some("unique_author_recipe") => {
                    String::from("An author cannot have two recipes with the same name")
                }
                Some("unique_name_measurement_unit") => {
                    String::from("This ingredient and measurement unit pair already exists")
                }
                Some("unique_favorite_recipe") => String::from("Recipe is already in favorites"),
                Some("unique_shopping_cart") => {
                    String::from("Recipe is already in the shopping cart")
                }
                Some("unique_subscription") => {
                    String::from("Subscribing twice to the same author is not possible")
                }
                _ => format!("Uniqueness violated: {}", value.info),
            });
        }
        if value.is_foreign_key_violation() {
            return Error::Conflict(format!("Reference violated: {}", value.info));
        }
        if value.is_check_violation() {
            return Error::Validation(format!("Value out of range: {}", value.info));
        }
        Error::Internal(value.info)
    }
}

pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl CacheError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<CacheError> for Error {
    fn from(value: CacheError) -> Self {
        Error::Internal(value.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            Error::Validation(String::from("x")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Conflict(String::from("x")).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Protected(String::from("x")).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::NotFound(String::from("x")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::NotInCollection(String::from("x")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Ownership(String::from("x")).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn body_carries_kind_and_detail() {
        let body = Error::Conflict(String::from("duplicate")).body();
        assert_eq!(body.kind, "conflict");
        assert_eq!(body.detail, "duplicate");
    }

    fn query_error(code: Option<&str>, constraint: Option<&str>) -> QueryError {
        QueryError {
            info: String::from("database says no"),
            code: code.map(String::from),
            constraint: constraint.map(String::from),
        }
    }

    #[test]
    fn constraint_violations_map_to_the_taxonomy() {
        let e: Error = query_error(Some("23505"), Some("unique_author_recipe")).into();
        assert_eq!(
            e,
            Error::Conflict(String::from(
                "An author cannot have two recipes with the same name"
            ))
        );

        let e: Error = query_error(Some("23505"), Some("unique_subscription")).into();
        assert!(matches!(e, Error::Conflict(_)));

        let e: Error = query_error(Some("23503"), None).into();
        assert!(matches!(e, Error::Conflict(_)));

        let e: Error = query_error(Some("23514"), Some("cooking_time_range")).into();
        assert!(matches!(e, Error::Validation(_)));

        let e: Error = query_error(None, None).into();
        assert!(matches!(e, Error::Internal(_)));
    }
}
