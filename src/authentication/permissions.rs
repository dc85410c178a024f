use crate::database::error::Error;
use crate::database::schema::Id;

use super::jwt::SessionData;

/// Mutating a recipe is reserved to its author.
pub fn ensure_author(session: &SessionData, author_id: Id) -> Result<(), Error> {
    if session.user_id != author_id {
        return Err(Error::Ownership(String::from(
            "Only the author can modify this recipe",
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: Id) -> SessionData {
        SessionData {
            user_id,
            username: String::from("cook"),
        }
    }

    #[test]
    fn author_passes() {
        assert!(ensure_author(&session(1), 1).is_ok());
    }

    #[test]
    fn non_author_is_denied() {
        assert!(matches!(
            ensure_author(&session(1), 2),
            Err(Error::Ownership(_))
        ));
    }
}
