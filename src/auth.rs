use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};

/// Shared-password authentication, optionally pinned to one user name.
#[derive(Debug, Clone)]
pub struct CarlotAuthSource {
    password: String,
    user: Option<String>,
}

impl CarlotAuthSource {
    pub fn new(password: String) -> Self {
        Self {
            password,
            user: None,
        }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    fn check_user(&self, login: Option<&str>) -> PgWireResult<()> {
        match (&self.user, login) {
            (None, _) => Ok(()),
            (Some(expected), Some(got)) if expected == got => Ok(()),
            (Some(_), got) => {
                metrics::counter!(crate::observability::CONNECTION_ERRORS_TOTAL).increment(1);
                tracing::warn!(user = got.unwrap_or(""), "rejected login for unknown user");
                Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                    "FATAL".into(),
                    "28000".into(),
                    format!("role \"{}\" is not permitted", got.unwrap_or("")),
                ))))
            }
        }
    }
}

#[async_trait]
impl AuthSource for CarlotAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        self.check_user(login.user())?;
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_user_when_unpinned() {
        let auth = CarlotAuthSource::new("pw".into());
        assert!(auth.check_user(Some("fleet")).is_ok());
        assert!(auth.check_user(None).is_ok());
    }

    #[test]
    fn pinned_user_must_match() {
        let auth = CarlotAuthSource::new("pw".into()).with_user(Some("fleet".into()));
        assert!(auth.check_user(Some("fleet")).is_ok());
        assert!(auth.check_user(Some("guest")).is_err());
        assert!(auth.check_user(None).is_err());
    }
}
