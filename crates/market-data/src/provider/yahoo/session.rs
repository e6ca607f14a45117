//! Cookie/crumb session handshake.
//!
//! Quote requests are only answered reliably when they carry the cookies set
//! by a regular page visit and a matching crumb token. Visitors from some
//! regions are first redirected to a consent interstitial, which has to be
//! answered (we always reject) before any cookies are issued.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode, Url};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::models::hidden_form_fields;
use super::YahooEndpoints;
use crate::errors::MarketDataError;

/// Delay before another handshake is attempted after a failure.
pub const CRUMB_RETRY_DELAY: Duration = Duration::from_secs(15);

/// Delay before another handshake is attempted after the crumb endpoint answered 429.
pub const CRUMB_RETRY_DELAY_RATE_LIMITED: Duration = Duration::from_secs(60);

/// Bound on every request made through the session client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

// ============================================================================
// Cookie Store
// ============================================================================

/// Cookie jar that can be emptied when the session is reset.
#[derive(Default)]
struct SessionCookies {
    jar: RwLock<Jar>,
}

impl SessionCookies {
    fn read(&self) -> RwLockReadGuard<'_, Jar> {
        self.jar.read().unwrap_or_else(|poisoned| {
            warn!("Session cookie lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Jar> {
        self.jar.write().unwrap_or_else(|poisoned| {
            warn!("Session cookie lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn clear(&self) {
        *self.write() = Jar::default();
    }

    fn has_cookies(&self, url: &Url) -> bool {
        self.read().cookies(url).is_some()
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.read().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.read().cookies(url)
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Outcome of one navigation during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentNavigation {
    /// The navigation ended on the consent host.
    pub needs_consent: bool,
    /// Raw consent page; empty when no consent is needed.
    pub consent_form: String,
    /// Where the consent form is posted.
    pub consent_post_url: Url,
    /// Final URL after redirects.
    pub resolved_url: Url,
}

#[derive(Debug)]
struct CrumbState {
    crumb: Option<String>,
    retry_delay: Duration,
    retry_not_before: Option<Instant>,
}

/// Owns the cookies and crumb that authorize quote requests.
///
/// One instance is shared by every coordinator. Acquisition and reset are
/// serialized by one lock, and acquisition re-checks the crumb once it holds
/// the lock, so concurrent callers never run two handshakes.
pub struct SessionHandshake {
    endpoints: YahooEndpoints,
    client: Client,
    cookies: Arc<SessionCookies>,
    state: Mutex<CrumbState>,
}

impl SessionHandshake {
    /// Create a session with the default request timeout.
    pub fn new(endpoints: YahooEndpoints) -> Result<Self, MarketDataError> {
        Self::with_timeout(endpoints, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        endpoints: YahooEndpoints,
        timeout: Duration,
    ) -> Result<Self, MarketDataError> {
        let cookies = Arc::new(SessionCookies::default());
        let client = Client::builder()
            .cookie_provider(cookies.clone())
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| MarketDataError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            endpoints,
            client,
            cookies,
            state: Mutex::new(CrumbState {
                crumb: None,
                retry_delay: CRUMB_RETRY_DELAY,
                retry_not_before: None,
            }),
        })
    }

    pub fn endpoints(&self) -> &YahooEndpoints {
        &self.endpoints
    }

    /// HTTP client carrying the session cookies.
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Currently held crumb, without attempting a handshake.
    pub async fn crumb(&self) -> Option<String> {
        self.state.lock().await.crumb.clone()
    }

    /// Delay the caller should wait before the next handshake attempt.
    pub async fn retry_delay(&self) -> Duration {
        self.state.lock().await.retry_delay
    }

    /// Return the held crumb, running the handshake when none is held.
    ///
    /// Failures are logged and yield `None`. While a previous failure's retry
    /// delay has not elapsed no new handshake is attempted.
    pub async fn ensure_crumb(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        if let Some(crumb) = &state.crumb {
            return Some(crumb.clone());
        }

        if let Some(not_before) = state.retry_not_before {
            if Instant::now() < not_before {
                debug!("Crumb handshake cooling down, proceeding without crumb");
                return None;
            }
        }

        self.acquire_locked(&mut state).await.ok()
    }

    /// Run the full handshake and return the new crumb.
    pub async fn acquire_crumb(&self) -> Result<String, MarketDataError> {
        let mut state = self.state.lock().await;
        self.acquire_locked(&mut state).await
    }

    /// Forget the crumb and cookies so the next use runs a fresh handshake.
    ///
    /// A retry delay still running from a failed handshake is kept.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.crumb = None;
        self.cookies.clear();
        info!("Session crumb and cookies reset");
    }

    async fn acquire_locked(&self, state: &mut CrumbState) -> Result<String, MarketDataError> {
        state.crumb = None;

        match self.handshake().await {
            Ok(crumb) => {
                state.crumb = Some(crumb.clone());
                state.retry_delay = CRUMB_RETRY_DELAY;
                state.retry_not_before = None;
                Ok(crumb)
            }
            Err(err) => {
                state.retry_delay = match err {
                    MarketDataError::CrumbUnavailable { status: 429 } => {
                        CRUMB_RETRY_DELAY_RATE_LIMITED
                    }
                    _ => CRUMB_RETRY_DELAY,
                };
                state.retry_not_before = Some(Instant::now() + state.retry_delay);
                warn!(
                    "Failed to obtain crumb: {}. Retrying in {} seconds",
                    err,
                    state.retry_delay.as_secs()
                );
                Err(err)
            }
        }
    }

    async fn handshake(&self) -> Result<String, MarketDataError> {
        let navigation = self.navigate(&self.endpoints.initial_url).await?;

        if navigation.needs_consent {
            let resolved = self.submit_consent(&navigation).await?;
            let second = self.navigate(resolved.as_str()).await?;
            if second.needs_consent {
                return Err(MarketDataError::ConsentLoopDetected);
            }
        }

        self.request_crumb().await
    }

    /// Visit `url` and report whether it ended on the consent interstitial.
    pub async fn navigate(&self, url: &str) -> Result<ConsentNavigation, MarketDataError> {
        debug!("Navigating to {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(MarketDataError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketDataError::NavigationFailed {
                status: status.as_u16(),
            });
        }

        let resolved_url = response.url().clone();
        let on_consent_host = resolved_url
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(&self.endpoints.consent_host));

        if on_consent_host {
            debug!("Consent requested at {}", resolved_url);
            let consent_form = response
                .text()
                .await
                .map_err(MarketDataError::from_transport)?;
            return Ok(ConsentNavigation {
                needs_consent: true,
                consent_form,
                consent_post_url: resolved_url.clone(),
                resolved_url,
            });
        }

        if self.cookies.has_cookies(&resolved_url) {
            debug!("Cookies stored for {}", resolved_url);
        }

        Ok(ConsentNavigation {
            needs_consent: false,
            consent_form: String::new(),
            consent_post_url: resolved_url.clone(),
            resolved_url,
        })
    }

    /// Reject the consent form and return the URL the rejection resolved to.
    async fn submit_consent(&self, navigation: &ConsentNavigation) -> Result<Url, MarketDataError> {
        let mut form = hidden_form_fields(&navigation.consent_form);
        form.push(("reject".to_string(), "reject".to_string()));

        debug!(
            "Posting consent form with {} fields to {}",
            form.len(),
            navigation.consent_post_url
        );

        let response = self
            .client
            .post(navigation.consent_post_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(MarketDataError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketDataError::ConsentFailed {
                status: status.as_u16(),
            });
        }

        Ok(response.url().clone())
    }

    async fn request_crumb(&self) -> Result<String, MarketDataError> {
        let crumb_url = &self.endpoints.crumb_url;
        let has_cookies = Url::parse(crumb_url)
            .map(|url| self.cookies.has_cookies(&url))
            .unwrap_or(false);
        if !has_cookies {
            info!("No cookies available, requesting crumb without them");
        }

        let response = self
            .client
            .get(crumb_url)
            .header(ACCEPT, "*/*")
            .send()
            .await
            .map_err(MarketDataError::from_transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(MarketDataError::CrumbUnavailable {
                status: status.as_u16(),
            });
        }

        let crumb = response
            .text()
            .await
            .map_err(MarketDataError::from_transport)?;

        if crumb.is_empty() {
            warn!("Crumb endpoint returned an empty crumb");
        } else {
            debug!("Crumb obtained");
        }

        Ok(crumb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONSENT_PAGE: &str = r#"<form method="post">
        <input type="hidden" name="csrfToken" value="tok-1">
        <input type="hidden" name="sessionId" value="sess-1">
        <button type="submit" name="reject" value="reject">Reject</button>
    </form>"#;

    fn session_for(server: &MockServer) -> SessionHandshake {
        SessionHandshake::with_timeout(
            YahooEndpoints::with_base_url(&server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn mount_navigation(server: &MockServer, status: u16) {
        Mock::given(method("GET"))
            .and(path("/quote/"))
            .respond_with(
                ResponseTemplate::new(status).insert_header("set-cookie", "A1=d=cookie; Path=/"),
            )
            .mount(server)
            .await;
    }

    async fn mount_crumb(server: &MockServer, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_acquire_without_consent() {
        let server = MockServer::start().await;
        mount_navigation(&server, 200).await;
        mount_crumb(&server, 200, "crumb-abc").await;

        let session = session_for(&server);
        assert_eq!(session.acquire_crumb().await, Ok("crumb-abc".to_string()));
        assert_eq!(session.crumb().await.as_deref(), Some("crumb-abc"));
        assert_eq!(session.retry_delay().await, CRUMB_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_navigation_failure() {
        let server = MockServer::start().await;
        mount_navigation(&server, 503).await;

        let session = session_for(&server);
        assert_eq!(
            session.acquire_crumb().await,
            Err(MarketDataError::NavigationFailed { status: 503 })
        );
        assert_eq!(session.crumb().await, None);
        assert_eq!(session.retry_delay().await, CRUMB_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_rate_limited_crumb_uses_longer_delay() {
        let server = MockServer::start().await;
        mount_navigation(&server, 200).await;
        mount_crumb(&server, 429, "Too Many Requests").await;

        let session = session_for(&server);
        assert_eq!(
            session.acquire_crumb().await,
            Err(MarketDataError::CrumbUnavailable { status: 429 })
        );
        assert_eq!(session.retry_delay().await, CRUMB_RETRY_DELAY_RATE_LIMITED);
    }

    #[tokio::test]
    async fn test_other_crumb_failure_uses_standard_delay() {
        let server = MockServer::start().await;
        mount_navigation(&server, 200).await;
        mount_crumb(&server, 403, "").await;

        let session = session_for(&server);
        assert_eq!(
            session.acquire_crumb().await,
            Err(MarketDataError::CrumbUnavailable { status: 403 })
        );
        assert_eq!(session.retry_delay().await, CRUMB_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_empty_crumb_is_returned() {
        let server = MockServer::start().await;
        mount_navigation(&server, 200).await;
        mount_crumb(&server, 200, "").await;

        let session = session_for(&server);
        assert_eq!(session.acquire_crumb().await, Ok(String::new()));
    }

    #[tokio::test]
    async fn test_consent_loop_detected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CONSENT_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/quote/"))
            .and(body_string_contains("csrfToken=tok-1"))
            .and(body_string_contains("sessionId=sess-1"))
            .and(body_string_contains("reject=reject"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CONSENT_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let mut endpoints = YahooEndpoints::with_base_url(&server.uri());
        endpoints.consent_host = "127.0.0.1".to_string();
        let session = SessionHandshake::new(endpoints).unwrap();

        assert_eq!(
            session.acquire_crumb().await,
            Err(MarketDataError::ConsentLoopDetected)
        );
    }

    #[tokio::test]
    async fn test_consent_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CONSENT_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/quote/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut endpoints = YahooEndpoints::with_base_url(&server.uri());
        endpoints.consent_host = "127.0.0.1".to_string();
        let session = SessionHandshake::new(endpoints).unwrap();

        assert_eq!(
            session.acquire_crumb().await,
            Err(MarketDataError::ConsentFailed { status: 500 })
        );
        assert_eq!(session.crumb().await, None);
    }

    #[tokio::test]
    async fn test_consent_then_crumb() {
        let server = MockServer::start().await;
        let port = server.address().port();

        // First visit lands on the consent host, served under "localhost".
        Mock::given(method("GET"))
            .and(path("/quote/"))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "location",
                format!("http://localhost:{}/collectConsent", port).as_str(),
            ))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/collectConsent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CONSENT_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collectConsent"))
            .and(body_string_contains("reject=reject"))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "location",
                format!("http://127.0.0.1:{}/quote/", port).as_str(),
            ))
            .expect(1)
            .mount(&server)
            .await;
        // Every later visit is a plain page with cookies.
        mount_navigation(&server, 200).await;
        mount_crumb(&server, 200, "after-consent").await;

        let mut endpoints = YahooEndpoints::with_base_url(&server.uri());
        endpoints.consent_host = "localhost".to_string();
        let session = SessionHandshake::new(endpoints).unwrap();

        assert_eq!(
            session.acquire_crumb().await,
            Ok("after-consent".to_string())
        );
    }

    #[tokio::test]
    async fn test_ensure_crumb_respects_retry_delay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        assert_eq!(session.ensure_crumb().await, None);
        assert_eq!(session.ensure_crumb().await, None);
    }

    #[tokio::test]
    async fn test_ensure_crumb_reuses_held_crumb() {
        let server = MockServer::start().await;
        mount_navigation(&server, 200).await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("shared"))
            .expect(1)
            .mount(&server)
            .await;

        let session = Arc::new(session_for(&server));
        let (a, b) = tokio::join!(session.ensure_crumb(), session.ensure_crumb());
        assert_eq!(a.as_deref(), Some("shared"));
        assert_eq!(b.as_deref(), Some("shared"));
    }

    #[tokio::test]
    async fn test_reset_clears_crumb() {
        let server = MockServer::start().await;
        mount_navigation(&server, 200).await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
            .expect(2)
            .mount(&server)
            .await;

        let session = session_for(&server);
        assert_eq!(session.ensure_crumb().await.as_deref(), Some("fresh"));

        session.reset().await;
        assert_eq!(session.crumb().await, None);

        assert_eq!(session.ensure_crumb().await.as_deref(), Some("fresh"));
    }
}
