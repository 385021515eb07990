#[derive(Clone)]
pub struct PasswordRules {
    pub min_len: usize,
    pub require_upper: bool,
    pub require_lower: bool,
    pub require_digit: bool,
}

impl Default for PasswordRules {
    fn default() -> Self {
        Self {
            min_len: 8,
            require_upper: true,
            require_lower: true,
            require_digit: true,
        }
    }
}

#[derive(Debug)]
pub enum PasswordPolicyError {
    TooShort { min_len: usize },
    MissingUpper,
    MissingLower,
    MissingDigit,
}

impl std::fmt::Display for PasswordPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordPolicyError::TooShort { min_len } => {
                write!(f, "password must be at least {min_len} characters")
            }
            PasswordPolicyError::MissingUpper => {
                write!(f, "password must include an uppercase letter")
            }
            PasswordPolicyError::MissingLower => {
                write!(f, "password must include a lowercase letter")
            }
            PasswordPolicyError::MissingDigit => write!(f, "password must include a digit"),
        }
    }
}

pub fn validate_password(rules: &PasswordRules, password: &str) -> Result<(), PasswordPolicyError> {
    if password.len() < rules.min_len {
        return Err(PasswordPolicyError::TooShort {
            min_len: rules.min_len,
        });
    }

    if rules.require_upper && !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(PasswordPolicyError::MissingUpper);
    }
    if rules.require_lower && !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(PasswordPolicyError::MissingLower);
    }
    if rules.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordPolicyError::MissingDigit);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_conforming_password() {
        assert!(validate_password(&PasswordRules::default(), "Passw0rd").is_ok());
    }

    #[test]
    fn rejects_short_and_missing_classes() {
        let rules = PasswordRules::default();
        assert!(validate_password(&rules, "Sh0rt").is_err());
        assert!(validate_password(&rules, "alllower1").is_err());
        assert!(validate_password(&rules, "ALLUPPER1").is_err());
        assert!(validate_password(&rules, "NoDigitsHere").is_err());
    }
}
