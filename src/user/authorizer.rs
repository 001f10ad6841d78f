use super::{CallerIdentity, UserStatus};

/// Answers whether a caller holds admin rights.
pub trait Authorizer: Send + Sync {
    fn is_admin(&self, caller: &CallerIdentity) -> bool;
}

/// Grants admin rights to one configured email, provided the account is approved.
#[derive(Debug, Clone)]
pub struct AdminEmailAuthorizer {
    admin_email: Option<String>,
}

impl AdminEmailAuthorizer {
    /// With `None` nobody is an admin.
    pub fn new(admin_email: Option<String>) -> Self {
        Self {
            admin_email: admin_email.map(|email| email.trim().to_string()),
        }
    }
}

impl Authorizer for AdminEmailAuthorizer {
    fn is_admin(&self, caller: &CallerIdentity) -> bool {
        match &self.admin_email {
            Some(admin_email) => {
                caller.status == UserStatus::Approved
                    && caller.email.trim().eq_ignore_ascii_case(admin_email)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_email_matches_case_insensitively() {
        let authorizer = AdminEmailAuthorizer::new(Some("Admin@Example.com".to_string()));
        assert!(authorizer.is_admin(&CallerIdentity::new("admin@example.com", UserStatus::Approved)));
        assert!(!authorizer.is_admin(&CallerIdentity::new("reader@example.com", UserStatus::Approved)));
    }

    #[test]
    fn test_admin_must_be_approved() {
        let authorizer = AdminEmailAuthorizer::new(Some("admin@example.com".to_string()));
        for status in [
            UserStatus::Pending,
            UserStatus::Rejected,
            UserStatus::Deactivated,
        ] {
            assert!(!authorizer.is_admin(&CallerIdentity::new("admin@example.com", status)));
        }
    }

    #[test]
    fn test_no_admin_configured() {
        let authorizer = AdminEmailAuthorizer::new(None);
        assert!(!authorizer.is_admin(&CallerIdentity::new("admin@example.com", UserStatus::Approved)));
    }
}
