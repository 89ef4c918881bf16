use serde::{Deserialize, Serialize};

pub const USERNAME_MAX_CHARS: usize = 150;

/// Local mirror of an account owned by the external auth subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String, // unique
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.username)
    }
}

/// Claims carried by the session token issued by the auth subsystem.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// subject / user id
    pub sub: String,
    pub username: String,
    pub exp: usize,
}

pub fn validate_username(username: &str) -> Result<String, String> {
    let username = username.trim();
    if username.is_empty() {
        return Err("Username is required".to_string());
    }
    if username.chars().count() > USERNAME_MAX_CHARS {
        return Err(format!(
            "Username must be at most {} characters",
            USERNAME_MAX_CHARS
        ));
    }
    Ok(username.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_trimmed_and_required() {
        assert_eq!(validate_username("  leo ").unwrap(), "leo");
        assert!(validate_username("   ").is_err());
        assert!(validate_username(&"u".repeat(151)).is_err());
    }
}
