//! Platform client seam and the Instagram web client.
//!
//! The orchestrator only needs two primitives: log in (optionally with a
//! second-factor code) and upload a photo with a caption. [`PlatformClient`]
//! captures exactly that so the posting logic can be exercised against a fake.

use crate::error::PlatformError;
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[async_trait]
pub trait PlatformClient: Send {
    /// Log in. `code` is the second-factor code for the retry attempt.
    async fn login(
        &mut self,
        username: &str,
        password: &str,
        code: Option<&str>,
    ) -> Result<(), PlatformError>;

    /// Publish the image at `path` with `caption`; returns the media id.
    async fn upload_photo(&mut self, path: &Path, caption: &str) -> Result<String, PlatformError>;
}

const BASE_URL: &str = "https://www.instagram.com";
const WEB_APP_ID: &str = "936619743392459";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    user: bool,
    #[serde(default)]
    two_factor_required: bool,
    two_factor_info: Option<TwoFactorInfo>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwoFactorInfo {
    two_factor_identifier: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: Option<String>,
    message: Option<String>,
    media: Option<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    id: String,
}

/// Instagram client speaking the web login and upload endpoints.
///
/// Session cookies live in the reqwest cookie store; the CSRF token is
/// refreshed from the cookies after every response.
pub struct InstagramClient {
    http: reqwest::Client,
    base_url: String,
    csrf_token: Option<String>,
    pending_two_factor: Option<String>,
    authenticated: bool,
}

impl InstagramClient {
    pub fn new() -> Result<Self, PlatformError> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            csrf_token: None,
            pending_two_factor: None,
            authenticated: false,
        })
    }

    fn remember_csrf(&mut self, resp: &reqwest::Response) {
        if let Some(cookie) = resp.cookies().find(|c| c.name() == "csrftoken") {
            self.csrf_token = Some(cookie.value().to_string());
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-IG-App-ID", WEB_APP_ID)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", format!("{}/", self.base_url));
        if let Some(token) = &self.csrf_token {
            req = req.header("X-CSRFToken", token);
        }
        req
    }

    async fn prime_csrf(&mut self) -> Result<(), PlatformError> {
        let resp = self
            .request(reqwest::Method::GET, "/accounts/login/")
            .send()
            .await?;
        self.remember_csrf(&resp);
        if self.csrf_token.is_none() {
            return Err(PlatformError::Transport("no csrftoken cookie issued".to_string()));
        }
        Ok(())
    }

    async fn password_login(&mut self, username: &str, password: &str) -> Result<(), PlatformError> {
        self.prime_csrf().await?;
        let timestamp = chrono::Utc::now().timestamp();
        let enc_password = format!("#PWD_INSTAGRAM_BROWSER:0:{timestamp}:{password}");
        let resp = self
            .request(reqwest::Method::POST, "/api/v1/web/accounts/login/ajax/")
            .form(&[
                ("username", username),
                ("enc_password", enc_password.as_str()),
                ("queryParams", "{}"),
                ("optIntoOneTap", "false"),
            ])
            .send()
            .await?;
        self.remember_csrf(&resp);
        let status = resp.status();
        let body: LoginResponse = resp.json().await?;
        debug!(%status, authenticated = body.authenticated, two_factor = body.two_factor_required, "Login response");

        if body.authenticated {
            self.pending_two_factor = None;
            return Ok(());
        }
        if body.two_factor_required {
            self.pending_two_factor = body.two_factor_info.map(|i| i.two_factor_identifier);
            return Err(PlatformError::SecondFactorRequired(
                "login requires a verification code".to_string(),
            ));
        }
        let message = body.message.unwrap_or_else(|| status.to_string());
        if !body.user || status == reqwest::StatusCode::BAD_REQUEST {
            Err(PlatformError::BadCredentials(message))
        } else {
            Err(PlatformError::Rejected(message))
        }
    }

    async fn two_factor_login(
        &mut self,
        username: &str,
        identifier: &str,
        code: &str,
    ) -> Result<(), PlatformError> {
        let resp = self
            .request(reqwest::Method::POST, "/api/v1/web/accounts/login/ajax/two_factor/")
            .form(&[
                ("username", username),
                ("verificationCode", code),
                ("identifier", identifier),
                ("queryParams", "{}"),
            ])
            .send()
            .await?;
        self.remember_csrf(&resp);
        let status = resp.status();
        let body: LoginResponse = resp.json().await?;
        if body.authenticated {
            self.pending_two_factor = None;
            Ok(())
        } else {
            Err(PlatformError::Rejected(
                body.message.unwrap_or_else(|| status.to_string()),
            ))
        }
    }
}

#[async_trait]
impl PlatformClient for InstagramClient {
    #[instrument(level = "info", skip(self, password, code), fields(with_code = code.is_some()))]
    async fn login(
        &mut self,
        username: &str,
        password: &str,
        code: Option<&str>,
    ) -> Result<(), PlatformError> {
        self.authenticated = false;
        let result = match code {
            None => self.password_login(username, password).await,
            Some(code) => {
                if self.pending_two_factor.is_none() {
                    // a fresh password attempt yields the challenge identifier
                    match self.password_login(username, password).await {
                        Ok(()) => {
                            self.authenticated = true;
                            return Ok(());
                        }
                        Err(PlatformError::SecondFactorRequired(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                let identifier = self.pending_two_factor.clone().ok_or_else(|| {
                    PlatformError::Rejected("no pending two-factor challenge".to_string())
                })?;
                self.two_factor_login(username, &identifier, code).await
            }
        };
        if result.is_ok() {
            self.authenticated = true;
            info!("Logged in");
        }
        result
    }

    #[instrument(level = "info", skip(self, caption), fields(path = %path.display()))]
    async fn upload_photo(&mut self, path: &Path, caption: &str) -> Result<String, PlatformError> {
        if !self.authenticated {
            return Err(PlatformError::NotAuthenticated);
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PlatformError::Transport(format!("reading {}: {e}", path.display())))?;

        let upload_id = chrono::Utc::now().timestamp_millis().to_string();
        let entity = format!("fb_uploader_{}_{}", upload_id, rand::rng().random_range(1_000..10_000));
        let rupload_params = json!({
            "media_type": 1,
            "upload_id": upload_id,
            "image_compression": r#"{"lib_name":"moz","lib_version":"3.1.m","quality":"80"}"#,
        });

        let resp = self
            .request(reqwest::Method::POST, &format!("/rupload_igphoto/{entity}"))
            .header("X-Entity-Name", &entity)
            .header("X-Entity-Length", bytes.len().to_string())
            .header("X-Entity-Type", "image/jpeg")
            .header("X-Instagram-Rupload-Params", rupload_params.to_string())
            .header("Offset", "0")
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        self.remember_csrf(&resp);
        if !resp.status().is_success() {
            return Err(PlatformError::Rejected(format!("upload returned {}", resp.status())));
        }

        let resp = self
            .request(reqwest::Method::POST, "/api/v1/media/configure/")
            .form(&[
                ("upload_id", upload_id.as_str()),
                ("caption", caption),
                ("source_type", "library"),
            ])
            .send()
            .await?;
        self.remember_csrf(&resp);
        let status = resp.status();
        let body: StatusResponse = resp.json().await?;
        match (body.status.as_deref(), body.media) {
            (Some("ok"), Some(media)) => {
                info!(media_id = %media.id, "Photo published");
                Ok(media.id)
            }
            _ => {
                let message = body.message.unwrap_or_else(|| status.to_string());
                warn!(%status, %message, "Configure step failed");
                Err(PlatformError::Rejected(message))
            }
        }
    }
}
