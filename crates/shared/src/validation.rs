//! Common validation utilities.

use validator::ValidationError;

/// Required suffix for member email addresses.
pub const UOFT_EMAIL_SUFFIX: &str = "@mail.utoronto.ca";

const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 20;

lazy_static::lazy_static! {
    pub static ref UTORID_REGEX: regex::Regex = regex::Regex::new(r"^[a-z0-9]{7,8}$").unwrap();
    static ref EMAIL_LOCAL_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z0-9._%+-]+$").unwrap();
}

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Validates a utorid: 7 to 8 lowercase alphanumeric characters.
pub fn validate_utorid(utorid: &str) -> Result<(), ValidationError> {
    if UTORID_REGEX.is_match(utorid) {
        Ok(())
    } else {
        Err(error(
            "utorid_format",
            "utorid must be 7-8 lowercase alphanumeric characters",
        ))
    }
}

/// Validates that an email is a University of Toronto mail address.
pub fn validate_uoft_email(email: &str) -> Result<(), ValidationError> {
    let local = match email.strip_suffix(UOFT_EMAIL_SUFFIX) {
        Some(local) => local,
        None => {
            return Err(error(
                "email_domain",
                "Email must end with @mail.utoronto.ca",
            ))
        }
    };

    if EMAIL_LOCAL_REGEX.is_match(local) {
        Ok(())
    } else {
        Err(error("email_format", "Invalid email format"))
    }
}

/// Validates password strength.
/// - 8 to 20 characters
/// - at least one uppercase, one lowercase, one digit and one special character
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(error(
            "password_length",
            "Password must be 8-20 characters",
        ));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    if has_upper && has_lower && has_digit && has_special {
        Ok(())
    } else {
        Err(error(
            "password_strength",
            "Password must contain an uppercase letter, a lowercase letter, a number and a special character",
        ))
    }
}

/// Largest purchase amount accepted in one transaction.
pub const MAX_SPENT: f64 = 1_000_000.0;

/// Validates that a currency amount is finite and within `0..=MAX_SPENT`.
pub fn validate_spent(spent: f64) -> Result<(), ValidationError> {
    if spent.is_finite() && (0.0..=MAX_SPENT).contains(&spent) {
        Ok(())
    } else {
        Err(error(
            "spent_range",
            "Spent must be a number between 0 and 1000000",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_utorid() {
        assert!(validate_utorid("johndoe1").is_ok());
        assert!(validate_utorid("clive12").is_ok());
        assert!(validate_utorid("short").is_err());
        assert!(validate_utorid("toolongid").is_err());
        assert!(validate_utorid("JohnDoe1").is_err());
        assert!(validate_utorid("john_do1").is_err());
    }

    #[test]
    fn test_validate_utorid_error_message() {
        let err = validate_utorid("x").unwrap_err();
        assert_eq!(
            err.message.unwrap().to_string(),
            "utorid must be 7-8 lowercase alphanumeric characters"
        );
    }

    #[test]
    fn test_validate_uoft_email() {
        assert!(validate_uoft_email("john.doe@mail.utoronto.ca").is_ok());
        assert!(validate_uoft_email("john.doe@utoronto.ca").is_err());
        assert!(validate_uoft_email("john.doe@gmail.com").is_err());
        assert!(validate_uoft_email("@mail.utoronto.ca").is_err());
        assert!(validate_uoft_email("john doe@mail.utoronto.ca").is_err());
    }

    #[test]
    fn test_validate_uoft_email_error_code() {
        let err = validate_uoft_email("a@example.com").unwrap_err();
        assert_eq!(err.code, "email_domain");
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Passw0rd!").is_ok());
        assert!(validate_password("Sh0rt!").is_err());
        assert!(validate_password("alllowercase1!").is_err());
        assert!(validate_password("ALLUPPERCASE1!").is_err());
        assert!(validate_password("NoDigits!!").is_err());
        assert!(validate_password("NoSpecial12").is_err());
        assert!(validate_password("Way-Too-Long-Password-123").is_err());
    }

    #[test]
    fn test_validate_spent() {
        assert!(validate_spent(0.0).is_ok());
        assert!(validate_spent(25.0).is_ok());
        assert!(validate_spent(-0.01).is_err());
        assert!(validate_spent(f64::NAN).is_err());
        assert!(validate_spent(f64::INFINITY).is_err());
        assert!(validate_spent(MAX_SPENT).is_ok());
        assert!(validate_spent(MAX_SPENT + 0.01).is_err());
        assert!(validate_spent(1e19).is_err());
    }
}
