//! IAM subject identities in `type:identifier` form.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use grantkeeper_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Kind of principal a subject string refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectType {
    /// Individual user account.
    User,
    /// Group of accounts.
    Group,
    /// Non-human service account.
    ServiceAccount,
}

impl SubjectType {
    /// Returns the IAM member prefix for this subject type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::ServiceAccount => "serviceAccount",
        }
    }
}

impl FromStr for SubjectType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "serviceAccount" | "service_account" => Ok(Self::ServiceAccount),
            _ => Err(AppError::Validation(format!(
                "unknown subject type '{value}'"
            ))),
        }
    }
}

/// A principal of the form `type:identifier`.
///
/// Identifiers are normalised to lower case, matching how email addresses are
/// compared by the IAM system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    subject_type: SubjectType,
    identifier: String,
}

impl Subject {
    /// Creates a subject from its parts.
    pub fn new(subject_type: SubjectType, identifier: impl Into<String>) -> AppResult<Self> {
        let identifier = identifier.into().trim().to_lowercase();
        if identifier.is_empty() {
            return Err(AppError::Validation(
                "subject identifier must not be empty".to_owned(),
            ));
        }
        if identifier.contains(':') {
            return Err(AppError::Validation(format!(
                "subject identifier '{identifier}' must not contain ':'"
            )));
        }

        Ok(Self {
            subject_type,
            identifier,
        })
    }

    /// Shorthand for a `user:` subject.
    pub fn user(email: impl Into<String>) -> AppResult<Self> {
        Self::new(SubjectType::User, email)
    }

    /// Parses a `type:identifier` string.
    pub fn parse(value: &str) -> AppResult<Self> {
        let mut parts = value.split(':');
        let (Some(subject_type), Some(identifier), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::Validation(format!(
                "invalid subject '{value}', expected type:identifier"
            )));
        };

        Self::new(SubjectType::from_str(subject_type)?, identifier)
    }

    /// Returns the subject type.
    #[must_use]
    pub fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    /// Returns the identifier without its type prefix.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.identifier.as_str()
    }
}

impl FromStr for Subject {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Display for Subject {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}:{}",
            self.subject_type.as_str(),
            self.identifier
        )
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{Subject, SubjectType};

    #[test]
    fn parses_user_subject_and_lowercases_identifier() {
        let subject = Subject::parse("user:Alice@Example.com");
        assert!(subject.is_ok());
        let subject = subject.unwrap_or_else(|_| unreachable!());
        assert_eq!(subject.subject_type(), SubjectType::User);
        assert_eq!(subject.identifier(), "alice@example.com");
        assert_eq!(subject.to_string(), "user:alice@example.com");
    }

    #[test]
    fn service_account_alias_renders_as_iam_prefix() {
        let subject = Subject::parse("service_account:job@project.iam.gserviceaccount.com");
        assert_eq!(
            subject.map(|value| value.to_string()).ok().as_deref(),
            Some("serviceAccount:job@project.iam.gserviceaccount.com")
        );
    }

    #[test]
    fn rejects_malformed_subjects() {
        assert!(Subject::parse("alice@example.com").is_err());
        assert!(Subject::parse("user:").is_err());
        assert!(Subject::parse("user:a:b").is_err());
        assert!(Subject::parse("robot:alice@example.com").is_err());
    }

    proptest! {
        #[test]
        fn rendered_subject_parses_back(
            kind in prop_oneof![
                Just(SubjectType::User),
                Just(SubjectType::Group),
                Just(SubjectType::ServiceAccount),
            ],
            identifier in "[a-z0-9._-]{1,24}@[a-z0-9-]{1,12}\\.[a-z]{2,4}",
        ) {
            let subject = Subject::new(kind, identifier.clone()).unwrap_or_else(|_| unreachable!());
            let reparsed = Subject::parse(subject.to_string().as_str());
            prop_assert_eq!(reparsed.ok(), Some(subject));
        }
    }
}
