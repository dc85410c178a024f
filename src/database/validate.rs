use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{REGEX_HEX_COLOR, REGEX_SLUG, REGEX_USERNAME};

use super::error::Error;

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(REGEX_HEX_COLOR).unwrap());
static USERNAME: Lazy<Regex> = Lazy::new(|| Regex::new(REGEX_USERNAME).unwrap());
static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(REGEX_SLUG).unwrap());

pub fn validate_hex_color(value: &str) -> Result<(), Error> {
    if !HEX_COLOR.is_match(value) {
        return Err(Error::Validation(format!(
            "`color` does not match the pattern \"{REGEX_HEX_COLOR}\""
        )));
    }
    Ok(())
}

pub fn validate_username(value: &str) -> Result<(), Error> {
    if !USERNAME.is_match(value) {
        return Err(Error::Validation(format!(
            "`username` does not match the pattern \"{REGEX_USERNAME}\""
        )));
    }
    Ok(())
}

pub fn validate_slug(value: &str) -> Result<(), Error> {
    if !SLUG.is_match(value) {
        return Err(Error::Validation(format!(
            "`slug` does not match the pattern \"{REGEX_SLUG}\""
        )));
    }
    Ok(())
}

/// Light structural check; the mail system is the real validator.
pub fn validate_email(value: &str) -> Result<(), Error> {
    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(Error::Validation(String::from(
            "`email` is not a valid address",
        )));
    }
    Ok(())
}

pub fn validate_range(field: &str, value: i32, min: i32, max: i32) -> Result<(), Error> {
    if value < min || value > max {
        return Err(Error::Validation(format!(
            "`{field}` must be between {min} and {max}"
        )));
    }
    Ok(())
}

pub fn validate_length(field: &str, value: &str, max: usize) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::Validation(format!("`{field}` must not be empty")));
    }
    if value.chars().count() > max {
        return Err(Error::Validation(format!(
            "`{field}` must be at most {max} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_short_and_long_hex_colors() {
        assert!(validate_hex_color("#fff").is_ok());
        assert!(validate_hex_color("#A1B2C3").is_ok());
    }

    #[test]
    fn rejects_malformed_hex_colors() {
        assert!(validate_hex_color("fff").is_err());
        assert!(validate_hex_color("#ffff").is_err());
        assert!(validate_hex_color("#ggg").is_err());
        assert!(validate_hex_color("#a1b2c3d4").is_err());
    }

    #[test]
    fn username_pattern() {
        assert!(validate_username("chef.remy_42").is_ok());
        assert!(validate_username("user@host+x-y").is_ok());
        assert!(validate_username("no spaces").is_err());
        assert!(validate_username("no#hash").is_err());
    }

    #[test]
    fn slug_pattern() {
        assert!(validate_slug("weekend-brunch_2").is_ok());
        assert!(validate_slug("тег").is_err());
        assert!(validate_slug("a b").is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("cook@example.com").is_ok());
        assert!(validate_email("cook@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        assert!(validate_range("cooking_time", 1, 1, 10000).is_ok());
        assert!(validate_range("cooking_time", 10000, 1, 10000).is_ok());
        assert!(validate_range("cooking_time", 0, 1, 10000).is_err());
        assert!(validate_range("cooking_time", 10001, 1, 10000).is_err());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let name = "щи".repeat(100);
        assert!(validate_length("name", &name, 200).is_ok());
        assert!(validate_length("name", "", 200).is_err());
    }
}
