use crate::error::{AppError, AppResult};

/// Checks the character count of `value` (not bytes) against inclusive bounds.
pub fn length(field: &str, value: &str, min: usize, max: usize) -> AppResult<()> {
    let len = value.chars().count();
    if len < min {
        return Err(AppError::BadRequest(format!(
            "{} must be at least {} characters",
            field, min
        )));
    }
    if len > max {
        return Err(AppError::BadRequest(format!(
            "{} must be {} characters or less",
            field, max
        )));
    }
    Ok(())
}

pub fn email(value: &str) -> AppResult<()> {
    let invalid = || AppError::BadRequest("Invalid email".into());

    if value.len() > 255 || value.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}

pub fn username(value: &str) -> AppResult<()> {
    length("Username", value, 3, 50)?;
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !allowed {
        return Err(AppError::BadRequest(
            "Username may only contain letters, numbers, hyphens and underscores".into(),
        ));
    }
    Ok(())
}

pub fn password(value: &str) -> AppResult<()> {
    length("Password", value, 6, 100)
}

/// `#rrggbb`
pub fn color(value: &str) -> AppResult<()> {
    let valid = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(AppError::BadRequest(
            "Color must be a hex value like #1a2b3c".into(),
        ));
    }
    Ok(())
}

/// Trims and rejects empty input, returning the owned trimmed string.
pub fn required(field: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_accepts_ordinary_addresses() {
        assert!(email("user@example.com").is_ok());
        assert!(email("first.last+tag@mail.example.cl").is_ok());
    }

    #[test]
    fn email_rejects_malformed_addresses() {
        for bad in ["", "plain", "@example.com", "a@b", "a@@b.com", "a b@c.com", "a@.com"] {
            assert!(email(bad).is_err(), "{bad} should be rejected");
        }
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(email(&long).is_err());
    }

    #[test]
    fn username_rules() {
        assert!(username("user_name-1").is_ok());
        assert!(username("ab").is_err());
        assert!(username(&"a".repeat(51)).is_err());
        assert!(username("with space").is_err());
        assert!(username("josé").is_err());
    }

    #[test]
    fn password_bounds() {
        assert!(password("12345").is_err());
        assert!(password("123456").is_ok());
        assert!(password(&"x".repeat(101)).is_err());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(length("Title", "ñññ", 3, 3).is_ok());
    }

    #[test]
    fn color_requires_six_hex_digits() {
        assert!(color("#1a2B3c").is_ok());
        assert!(color("1a2b3c").is_err());
        assert!(color("#1a2b3").is_err());
        assert!(color("#zzzzzz").is_err());
    }

    #[test]
    fn required_trims() {
        assert_eq!(required("Name", "  General ").unwrap(), "General");
        assert!(required("Name", "   ").is_err());
    }
}
