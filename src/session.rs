//! Browser-driven session bootstrap against the Steam storefront.
//!
//! Establishes (or reuses) a logged-in session, harvests the cookie set
//! and the playtime API bearer token, and persists both to the
//! credential store. The browser is left open for the transaction lister.

use crate::config::Config;
use crate::error::{ReportError, Result};
use crate::store::{CredentialStore, StoredCookie};
use fantoccini::cookies::Cookie;
use fantoccini::{Client, ClientBuilder};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

pub const HISTORY_URL: &str = "https://store.steampowered.com/account/history/";

/// Pulls the access token out of the first network-performance entry
/// whose URL carries an `access_token` query parameter. Returns null when
/// no such entry exists yet.
const TOKEN_SCRIPT: &str = r#"
const entry = window.performance.getEntries().map(e => e.name).find(n => n.includes('access_token'));
if (!entry) { return null; }
return new URLSearchParams(new URL(entry).search).get('access_token');
"#;

pub struct Browser {
    client: Client,
    driver: Option<Child>,
}

impl Browser {
    /// Spawn geckodriver and connect a WebDriver client to it.
    pub async fn launch(config: &Config) -> Result<Self> {
        info!("Starting {}", config.args.geckodriver);
        let driver = Command::new(&config.args.geckodriver)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let mut attempts = 0;
        let client = loop {
            sleep(Duration::from_millis(500)).await;
            match ClientBuilder::native()
                .connect(&config.args.webdriver_url)
                .await
            {
                Ok(client) => break client,
                Err(e) if attempts < 10 => {
                    attempts += 1;
                    debug!("WebDriver not ready yet (attempt {attempts}): {e}");
                }
                Err(e) => return Err(e.into()),
            }
        };
        info!("WebDriver client connected to {}", config.args.webdriver_url);

        Ok(Self {
            client,
            driver: Some(driver),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn close(mut self) -> Result<()> {
        self.client.clone().close().await?;
        if let Some(mut child) = self.driver.take() {
            info!("Stopping geckodriver");
            let _ = child.kill();
        }
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        if let Some(mut child) = self.driver.take() {
            let _ = child.kill();
        }
    }
}

/// Establish a logged-in session on the account-history page and persist
/// the harvested cookies and access token.
pub async fn bootstrap(config: &Config, store: &CredentialStore) -> Result<Browser> {
    let browser = Browser::launch(config).await?;
    let client = browser.client();

    client.goto(HISTORY_URL).await?;

    // Inject any cookies from a previous run, then navigate again so the
    // storefront sees them.
    let creds = store.load()?;
    for cookie in &creds.sel {
        if let Err(e) = client.add_cookie(to_webdriver_cookie(cookie)).await {
            debug!("Skipping stored cookie {}: {e}", cookie.name);
        }
    }
    client.goto(HISTORY_URL).await?;

    wait_for_login(client, config.args.login_timeout).await?;
    info!("Navigated to {HISTORY_URL}");

    let cookies = harvest_cookies(client).await?;

    // Give page telemetry a moment to record the API request that
    // carries the token.
    sleep(Duration::from_secs(1)).await;
    let token = extract_access_token(client).await;

    // Cookies are flushed even when token extraction failed, so the next
    // run can at least skip the login step.
    store.update(|creds| {
        creds.sel = cookies;
        creds.rebuild_req();
        creds.captured_at = Some(chrono::Utc::now().timestamp());
        if let Ok(token) = &token {
            creds.access_token = token.clone();
        }
        Ok(())
    })?;
    token?;

    Ok(browser)
}

/// Poll the browser location until it settles on the history page. A
/// redirect to the login flow clears the (stale) cookies once and tells
/// the operator what to do; the wait itself is bounded by the configured
/// timeout rather than blocking forever.
async fn wait_for_login(client: &Client, timeout_secs: u64) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let mut cleared = false;
    loop {
        let url = client.current_url().await?;
        if url.as_str() == HISTORY_URL {
            return Ok(());
        }
        if !cleared && url.as_str().contains("login") {
            client.delete_all_cookies().await?;
            warn!("Stored session was rejected. Log in to Steam in the browser window to continue");
            cleared = true;
        }
        if Instant::now() >= deadline {
            return Err(ReportError::LoginTimeout(timeout_secs));
        }
        sleep(Duration::from_millis(500)).await;
    }
}

async fn harvest_cookies(client: &Client) -> Result<Vec<StoredCookie>> {
    let cookies = client.get_all_cookies().await?;
    info!("Captured {} session cookies", cookies.len());
    Ok(cookies.iter().map(from_webdriver_cookie).collect())
}

async fn extract_access_token(client: &Client) -> Result<String> {
    let value = client.execute(TOKEN_SCRIPT, vec![]).await?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or(ReportError::TokenMissing)
}

fn to_webdriver_cookie(cookie: &StoredCookie) -> Cookie<'static> {
    let mut out = Cookie::new(cookie.name.clone(), cookie.value.clone());
    if let Some(domain) = &cookie.domain {
        out.set_domain(domain.clone());
    }
    if let Some(path) = &cookie.path {
        out.set_path(path.clone());
    }
    out.set_secure(cookie.secure);
    out.set_http_only(cookie.http_only);
    out
}

fn from_webdriver_cookie(cookie: &Cookie<'_>) -> StoredCookie {
    StoredCookie {
        name: cookie.name().to_string(),
        value: cookie.value().to_string(),
        domain: cookie.domain().map(str::to_string),
        path: cookie.path().map(str::to_string),
        secure: cookie.secure().unwrap_or(false),
        http_only: cookie.http_only().unwrap_or(false),
    }
}
