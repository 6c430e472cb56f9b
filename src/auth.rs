//! Login state machine with the email second-factor escalation.
//!
//! ```text
//! Unauthenticated --login ok--------------------------------> Authenticated
//!        |
//!        +--login failed--> fetch code from mailbox --found--> login(code) --ok--> Authenticated
//!                                     |                              |
//!                                 not found                      failed
//!                                     v                              v
//!                               AuthError::CodeNotFound     AuthError::SecondFactor
//! ```
//!
//! Mailbox connection failures surface as [`AuthError::Mailbox`]; the
//! orchestrator treats those as fatal for the whole run.

use crate::config::PlatformConfig;
use crate::error::{AuthError, PlatformError};
use crate::mailbox::CodeSource;
use crate::platform::PlatformClient;
use std::path::Path;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

pub struct Authenticator {
    platform: Box<dyn PlatformClient>,
    codes: Box<dyn CodeSource>,
    username: String,
    password: String,
    strict_second_factor: bool,
    state: AuthState,
}

impl Authenticator {
    pub fn new(
        platform: Box<dyn PlatformClient>,
        codes: Box<dyn CodeSource>,
        config: &PlatformConfig,
    ) -> Self {
        Self {
            platform,
            codes,
            username: config.username.clone(),
            password: config.password.clone(),
            strict_second_factor: config.strict_second_factor,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    fn escalates(&self, err: &PlatformError) -> bool {
        !self.strict_second_factor || matches!(err, PlatformError::SecondFactorRequired(_))
    }

    /// Log in unless this run already has.
    #[instrument(level = "info", skip(self), fields(user = %self.username))]
    pub async fn ensure_authenticated(&mut self) -> Result<(), AuthError> {
        if self.state == AuthState::Authenticated {
            return Ok(());
        }

        let first = self
            .platform
            .login(&self.username, &self.password, None)
            .await;
        let err = match first {
            Ok(()) => {
                self.state = AuthState::Authenticated;
                info!("Logged in");
                return Ok(());
            }
            Err(e) => e,
        };

        if !self.escalates(&err) {
            error!(error = %err, "Login failed without a second-factor challenge");
            return Err(AuthError::Login(err));
        }

        warn!(error = %err, "2FA required. Fetching verification code from email");
        let Some(code) = self.codes.retrieve_code().await? else {
            error!("Failed to fetch 2FA code");
            return Err(AuthError::CodeNotFound);
        };

        match self
            .platform
            .login(&self.username, &self.password, Some(&code))
            .await
        {
            Ok(()) => {
                self.state = AuthState::Authenticated;
                info!("Logged in with 2FA code");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login with 2FA code failed");
                Err(AuthError::SecondFactor(e))
            }
        }
    }

    /// Upload a photo; requires a prior successful [`Self::ensure_authenticated`].
    pub async fn publish(&mut self, path: &Path, caption: &str) -> Result<String, PlatformError> {
        if self.state != AuthState::Authenticated {
            return Err(PlatformError::NotAuthenticated);
        }
        self.platform.upload_photo(path, caption).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::MailboxError;
    use crate::platform::tests::MockPlatform;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Scripted code source that counts how often it is asked.
    #[derive(Clone)]
    pub struct FakeCodes {
        pub code: Option<String>,
        pub unreachable: bool,
        pub calls: Arc<Mutex<usize>>,
    }

    impl FakeCodes {
        pub fn found(code: &str) -> Self {
            Self {
                code: Some(code.to_string()),
                unreachable: false,
                calls: Arc::new(Mutex::new(0)),
            }
        }

        pub fn empty() -> Self {
            Self {
                code: None,
                ..Self::found("")
            }
        }

        pub fn unreachable() -> Self {
            Self {
                unreachable: true,
                ..Self::empty()
            }
        }

        pub fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CodeSource for FakeCodes {
        async fn retrieve_code(&self) -> Result<Option<String>, MailboxError> {
            *self.calls.lock().unwrap() += 1;
            if self.unreachable {
                return Err(MailboxError::Connect("connection refused".to_string()));
            }
            Ok(self.code.clone())
        }
    }

    fn config(strict: bool) -> PlatformConfig {
        PlatformConfig {
            username: "poster".to_string(),
            password: "secret".to_string(),
            strict_second_factor: strict,
        }
    }

    fn rejected() -> PlatformError {
        PlatformError::Rejected("checkpoint".to_string())
    }

    #[tokio::test]
    async fn test_primary_login_success() {
        let platform = MockPlatform::accepting();
        let log = platform.log.clone();
        let codes = FakeCodes::found("123456");
        let mut auth = Authenticator::new(Box::new(platform), Box::new(codes.clone()), &config(false));

        auth.ensure_authenticated().await.unwrap();
        auth.ensure_authenticated().await.unwrap();

        assert_eq!(auth.state(), AuthState::Authenticated);
        assert_eq!(log.lock().unwrap().logins, vec![None]);
        assert_eq!(codes.call_count(), 0);
    }

    #[tokio::test]
    async fn test_any_failure_escalates_to_code() {
        let platform = MockPlatform::new(vec![Err(rejected()), Ok(())]);
        let log = platform.log.clone();
        let codes = FakeCodes::found("654321");
        let mut auth = Authenticator::new(Box::new(platform), Box::new(codes.clone()), &config(false));

        auth.ensure_authenticated().await.unwrap();

        assert_eq!(
            log.lock().unwrap().logins,
            vec![None, Some("654321".to_string())]
        );
        assert_eq!(codes.call_count(), 1);
    }

    #[tokio::test]
    async fn test_code_not_found_is_terminal() {
        let platform = MockPlatform::new(vec![Err(rejected())]);
        let log = platform.log.clone();
        let mut auth =
            Authenticator::new(Box::new(platform), Box::new(FakeCodes::empty()), &config(false));

        let err = auth.ensure_authenticated().await.unwrap_err();

        assert!(matches!(err, AuthError::CodeNotFound));
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert_eq!(log.lock().unwrap().logins.len(), 1);
    }

    #[tokio::test]
    async fn test_second_failure_is_terminal() {
        let platform = MockPlatform::new(vec![Err(rejected()), Err(rejected())]);
        let mut auth = Authenticator::new(
            Box::new(platform),
            Box::new(FakeCodes::found("111111")),
            &config(false),
        );

        let err = auth.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, AuthError::SecondFactor(_)));
    }

    #[tokio::test]
    async fn test_mailbox_failure_propagates() {
        let platform = MockPlatform::new(vec![Err(rejected())]);
        let mut auth = Authenticator::new(
            Box::new(platform),
            Box::new(FakeCodes::unreachable()),
            &config(false),
        );

        let err = auth.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, AuthError::Mailbox(_)));
    }

    #[tokio::test]
    async fn test_strict_mode_fails_fast_on_bad_credentials() {
        let platform = MockPlatform::new(vec![Err(PlatformError::BadCredentials(
            "wrong password".to_string(),
        ))]);
        let codes = FakeCodes::found("123456");
        let mut auth = Authenticator::new(Box::new(platform), Box::new(codes.clone()), &config(true));

        let err = auth.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, AuthError::Login(PlatformError::BadCredentials(_))));
        assert_eq!(codes.call_count(), 0);
    }

    #[tokio::test]
    async fn test_strict_mode_escalates_on_challenge() {
        let platform = MockPlatform::new(vec![
            Err(PlatformError::SecondFactorRequired("code".to_string())),
            Ok(()),
        ]);
        let mut auth = Authenticator::new(
            Box::new(platform),
            Box::new(FakeCodes::found("123456")),
            &config(true),
        );

        auth.ensure_authenticated().await.unwrap();
        assert_eq!(auth.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_publish_requires_authentication() {
        let mut auth = Authenticator::new(
            Box::new(MockPlatform::accepting()),
            Box::new(FakeCodes::empty()),
            &config(false),
        );
        let err = auth.publish(Path::new("/tmp/x.jpg"), "c").await.unwrap_err();
        assert!(matches!(err, PlatformError::NotAuthenticated));
    }
}
