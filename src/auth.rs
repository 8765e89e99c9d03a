use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Response, Url, redirect};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::pkce;
use crate::{Error, Result};

pub const DEFAULT_LOGIN_BASE: &str =
    "https://remehalogin.bdrthermea.net/bdrb2cprod.onmicrosoft.com";

const CLIENT_ID: &str = "6ce007c6-0628-419e-88f4-bee2e6418eec";
const REDIRECT_URI: &str = "com.b2c.remehaapp://login-callback";
const SCOPE: &str =
    "openid https://bdrb2cprod.onmicrosoft.com/iotdevice/user_impersonation offline_access";
const AUTHORIZE_POLICY: &str = "B2C_1A_RPSignUpSignInNewRoomV3.1";
const SIGNIN_POLICY: &str = "B2C_1A_RPSignUpSignInNewRoomv3.1";
const CSRF_COOKIE: &str = "x-ms-cpim-csrf";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 30;

pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub enum Credentials {
    Password { email: String, password: String },
    RefreshToken(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::RefreshToken(_) => f.write_str("RefreshToken(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(deserialize_with = "seconds")]
    expires_in: i64,
}

/// B2C has been seen sending `expires_in` both as a number and as a string.
fn seconds<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<i64, D::Error> {
    match Value::deserialize(de)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("expires_in out of range")),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expires_in must be a number, got {other}"
        ))),
    }
}

pub struct TokenProviderBuilder {
    login_base: String,
    token_timeout: Duration,
    login_timeout: Duration,
    token_file: Option<PathBuf>,
    token: Option<Token>,
}

impl TokenProviderBuilder {
    pub fn new() -> Self {
        Self {
            login_base: DEFAULT_LOGIN_BASE.to_string(),
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            token_file: None,
            token: None,
        }
    }

    pub fn login_base(mut self, url: impl Into<String>) -> Self {
        self.login_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }

    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Persist every new token to `path`, and start from the token stored
    /// there if one exists.
    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Start from a known token instead of logging in.
    pub fn token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    pub fn build(self) -> Result<TokenProvider> {
        let jar = Arc::new(Jar::default());
        // The confirmation step redirects to the app's custom scheme; stop
        // there so the authorization code can be read from `Location`.
        let policy = redirect::Policy::custom(|attempt| {
            let web = matches!(attempt.url().scheme(), "http" | "https");
            if web && attempt.previous().len() < 10 {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .redirect(policy)
            .build()?;

        let token = match (self.token, &self.token_file) {
            (Some(token), _) => Some(token),
            (None, Some(path)) => load_token(path),
            (None, None) => None,
        };

        Ok(TokenProvider {
            http,
            jar,
            login_base: self.login_base,
            token_timeout: self.token_timeout,
            login_timeout: self.login_timeout,
            token_file: self.token_file,
            token: Mutex::new(token),
        })
    }
}

impl Default for TokenProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// OAuth2 tokens for the Remeha B2C identity provider.
///
/// Logs in with email and password (authorize page, credential post,
/// confirmation redirect, code exchange) or with an externally obtained
/// refresh token. The token is cached and refreshed lazily by
/// [`get_valid_access_token`](Self::get_valid_access_token).
pub struct TokenProvider {
    http: reqwest::Client,
    jar: Arc<Jar>,
    login_base: String,
    token_timeout: Duration,
    login_timeout: Duration,
    token_file: Option<PathBuf>,
    token: Mutex<Option<Token>>,
}

impl TokenProvider {
    pub fn builder() -> TokenProviderBuilder {
        TokenProviderBuilder::new()
    }

    pub async fn current_token(&self) -> Option<Token> {
        self.token.lock().await.clone()
    }

    pub async fn has_token(&self) -> bool {
        self.token.lock().await.is_some()
    }

    /// Forget the cached credential. Callers must `login` again afterwards.
    pub async fn clear(&self) {
        *self.token.lock().await = None;
    }

    /// Exchange user-supplied identity for a fresh token pair.
    pub async fn login(&self, credentials: &Credentials) -> Result<Token> {
        let token = match credentials {
            Credentials::Password { email, password } => {
                tokio::time::timeout(self.login_timeout, self.password_flow(email, password))
                    .await??
            }
            Credentials::RefreshToken(refresh) => self
                .exchange_refresh(refresh)
                .await
                .map_err(rejected_if_expired)?,
        };
        info!(expires_at = %token.expires_at, "logged in to Remeha Home");
        let mut slot = self.token.lock().await;
        self.store(&mut slot, token.clone()).await;
        Ok(token)
    }

    /// Exchange `token`'s refresh token for a new pair.
    pub async fn refresh(&self, token: &Token) -> Result<Token> {
        let mut guard = self.token.lock().await;
        self.refresh_locked(&mut guard, &token.refresh_token).await
    }

    /// The cached access token, refreshed first when it is about to expire.
    pub async fn get_valid_access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        let refresh = match guard.as_ref() {
            None => return Err(Error::AuthRequired),
            Some(token) if token.is_fresh(Utc::now()) => return Ok(token.access_token.clone()),
            Some(token) => token.refresh_token.clone(),
        };
        debug!("access token expired, refreshing");
        let token = self.refresh_locked(&mut guard, &refresh).await?;
        Ok(token.access_token)
    }

    async fn refresh_locked(&self, slot: &mut Option<Token>, refresh: &str) -> Result<Token> {
        match self.exchange_refresh(refresh).await {
            Ok(token) => {
                debug!(expires_at = %token.expires_at, "token refreshed");
                self.store(slot, token.clone()).await;
                Ok(token)
            }
            Err(e @ Error::AuthExpired(_)) => {
                warn!(error = %e, "refresh token rejected, discarding credentials");
                *slot = None;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange_refresh(&self, refresh: &str) -> Result<Token> {
        let mut token = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh),
                ("client_id", CLIENT_ID),
            ])
            .await?;
        if token.refresh_token.is_empty() {
            token.refresh_token = refresh.to_string();
        }
        Ok(token)
    }

    async fn password_flow(&self, email: &str, password: &str) -> Result<Token> {
        let verifier = pkce::generate_verifier();
        let challenge = pkce::compute_challenge(&verifier);
        let state = pkce::generate_state();

        let authorize_url = format!("{}/oauth2/v2.0/authorize", self.login_base);
        debug!(url = %authorize_url, "requesting login page");
        let response = self
            .http
            .get(&authorize_url)
            .query(&[
                ("response_type", "code"),
                ("client_id", CLIENT_ID),
                ("redirect_uri", REDIRECT_URI),
                ("scope", SCOPE),
                ("state", state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("p", AUTHORIZE_POLICY),
                ("brand", "remeha"),
                ("lang", "en"),
                ("nonce", "defaultNonce"),
                ("prompt", "login"),
                ("signUp", "False"),
            ])
            .send()
            .await?;
        let response = reject_unless_success(response, "authorize").await?;

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::AuthRejected("login page has no x-request-id".into()))?
            .to_string();
        let tx = pkce::state_properties(&request_id);
        let csrf = self.csrf_token()?;

        let self_asserted = format!("{}/{}/SelfAsserted", self.login_base, SIGNIN_POLICY);
        debug!(url = %self_asserted, "submitting credentials");
        let response = self
            .http
            .post(&self_asserted)
            .query(&[("tx", tx.as_str()), ("p", SIGNIN_POLICY)])
            .header("x-csrf-token", &csrf)
            .form(&[
                ("request_type", "RESPONSE"),
                ("signInName", email),
                ("password", password),
            ])
            .send()
            .await?;
        let response = reject_unless_success(response, "credential submission").await?;
        let body = response.text().await?;
        if !self_asserted_ok(&body) {
            return Err(Error::AuthRejected(format!("credentials refused: {body}")));
        }

        let confirmed = format!(
            "{}/{}/api/CombinedSigninAndSignup/confirmed",
            self.login_base, SIGNIN_POLICY
        );
        debug!(url = %confirmed, "confirming sign-in");
        let response = self
            .http
            .get(&confirmed)
            .query(&[
                ("rememberMe", "false"),
                ("csrf_token", csrf.as_str()),
                ("tx", tx.as_str()),
                ("p", SIGNIN_POLICY),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() && !status.is_redirection() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthRejected(format!(
                "confirmation returned {status}: {body}"
            )));
        }
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::AuthRejected("confirmation did not redirect".into()))?;
        let code = authorization_code(location)?;

        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
            ("client_id", CLIENT_ID),
        ])
        .await
        .map_err(rejected_if_expired)
    }

    fn csrf_token(&self) -> Result<String> {
        let url = Url::parse(&self.login_base)
            .map_err(|e| Error::Config(format!("invalid login base URL: {e}")))?;
        let header = self
            .jar
            .cookies(&url)
            .ok_or_else(|| Error::AuthRejected("login page set no cookies".into()))?;
        let cookies = header
            .to_str()
            .map_err(|_| Error::AuthRejected("unreadable login cookies".into()))?;
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == CSRF_COOKIE)
            .map(|(_, value)| value.to_string())
            .ok_or_else(|| Error::AuthRejected(format!("missing {CSRF_COOKIE} cookie")))
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<Token> {
        let url = format!("{}/oauth2/v2.0/token", self.login_base);
        let response = self
            .http
            .post(&url)
            .query(&[("p", AUTHORIZE_POLICY)])
            .form(params)
            .timeout(self.token_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        if matches!(status, 400 | 401 | 403) {
            let body = response.text().await.unwrap_or_default();
            let description = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error_description")?.as_str().map(str::to_string))
                .unwrap_or(body);
            warn!(status, %description, "token request rejected");
            return Err(Error::AuthExpired(description));
        }
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http { status, body });
        }

        let parsed: TokenResponse = response.json().await?;
        Ok(Token {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token.unwrap_or_default(),
            expires_at: Utc::now() + chrono::Duration::seconds(parsed.expires_in),
        })
    }

    async fn store(&self, slot: &mut Option<Token>, token: Token) {
        if let Some(path) = &self.token_file {
            match serde_json::to_vec(&token) {
                Ok(json) => {
                    if let Err(e) = write_private(path, &json).await {
                        warn!(path = %path.display(), "failed to persist token: {e}");
                    }
                }
                Err(e) => warn!("failed to serialize token: {e}"),
            }
        }
        *slot = Some(token);
    }
}

/// Write `contents` readable by the owner only; the file holds a refresh token.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // `mode` only applies to newly created files.
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
    }
    file.write_all(contents).await?;
    file.flush().await
}

fn load_token(path: &Path) -> Option<Token> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(token) => {
            debug!(path = %path.display(), "loaded persisted token");
            Some(token)
        }
        Err(e) => {
            warn!(path = %path.display(), "ignoring unreadable token file: {e}");
            None
        }
    }
}

async fn reject_unless_success(response: Response, step: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::AuthRejected(format!("{step} returned {status}: {body}")))
}

/// During login a rejected token exchange means the identity was refused.
fn rejected_if_expired(e: Error) -> Error {
    match e {
        Error::AuthExpired(msg) => Error::AuthRejected(msg),
        other => other,
    }
}

fn self_asserted_ok(body: &str) -> bool {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    match json.get("status") {
        Some(Value::String(s)) => s == "200",
        Some(Value::Number(n)) => n.as_u64() == Some(200),
        _ => false,
    }
}

fn authorization_code(location: &str) -> Result<String> {
    let url = Url::parse(location)
        .map_err(|e| Error::AuthRejected(format!("bad redirect {location}: {e}")))?;
    if let Some(code) = url.query_pairs().find(|(k, _)| k == "code") {
        return Ok(code.1.into_owned());
    }
    let reason = url
        .query_pairs()
        .find(|(k, _)| k == "error_description")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| "no authorization code".to_string());
    Err(Error::AuthRejected(reason))
}
