use garde::Validate;

use crate::error::{AppError, Result};

/// Fields of a new account that must validate before hashing.
#[derive(Debug, Validate)]
pub struct Registration {
    #[garde(pattern(r"^[A-Za-z ,.'\-]+$"))]
    pub forename: String,
    #[garde(pattern(r"^[A-Za-z ,.'\-]+$"))]
    pub surname: String,
    #[garde(email)]
    pub email: String,
}

/// Validates names and email, reporting the first offending field.
pub fn validate_registration(forename: &str, surname: &str, email: &str) -> Result<()> {
    let registration = Registration {
        forename: forename.to_string(),
        surname: surname.to_string(),
        email: email.to_string(),
    };

    if let Err(report) = registration.validate() {
        let field = report
            .iter()
            .next()
            .map(|(path, _)| path.to_string())
            .unwrap_or_else(|| "registration".to_string());
        return Err(AppError::InvalidField(field));
    }

    validate_email(email)
}

/// Basic `x@y.z` shape with no whitespace.
pub fn validate_email(email: &str) -> Result<()> {
    let invalid = || AppError::InvalidField("email".to_string());

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if local.is_empty() || host.is_empty() || tld.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    Ok(())
}

/// At least 8 characters with an uppercase letter, a digit and a symbol.
pub fn validate_password(password: &str) -> Result<()> {
    let long_enough = password.chars().count() >= 8;
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if long_enough && has_upper && has_digit && has_symbol {
        Ok(())
    } else {
        Err(AppError::WeakPassword)
    }
}
