use serde::{Deserialize, Serialize};

/// Authenticated caller on whose behalf an access operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    email: String,
    display_name: String,
}

impl UserIdentity {
    /// Creates a user identity from authentication data.
    ///
    /// The email is normalised to lower case so it compares equal to the
    /// identifier part of stored subjects.
    #[must_use]
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_lowercase(),
            display_name: display_name.into(),
        }
    }

    /// Returns the normalised email of the caller.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the display name for the current user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the caller as an IAM member string (`user:<email>`).
    #[must_use]
    pub fn subject(&self) -> String {
        format!("user:{}", self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::UserIdentity;

    #[test]
    fn email_is_normalised() {
        let identity = UserIdentity::new("  Alice@Example.COM ", "Alice");
        assert_eq!(identity.email(), "alice@example.com");
        assert_eq!(identity.subject(), "user:alice@example.com");
    }
}
