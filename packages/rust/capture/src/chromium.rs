//! Headless Chrome renderer over the DevTools protocol.
//!
//! One browser process is launched per batch and shared across items. Each
//! [`PageRenderer::render`] call opens its own tab, configures it (user
//! agent, language, viewport, dialog auto-accept), navigates, and always
//! resets and closes the tab before returning.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventJavascriptDialogOpening, HandleJavaScriptDialogParams, Viewport,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig as CdpConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use toolharvest_shared::{BrowserConfig, Result, ToolHarvestError};
use tracing::{debug, info, instrument, warn};

use crate::renderer::{PageRenderer, RenderOptions, RenderedPage};

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

/// Resolves once the document is interactive, or after 10s.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

const BODY_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

/// Upper bound for reading the navigation response after `goto` returned.
const RESPONSE_WAIT: Duration = Duration::from_secs(5);

/// Shared headless browser.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    config: BrowserConfig,
}

impl ChromiumRenderer {
    /// Launch the browser process.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        info!(headless = config.headless, "launching browser");

        let mut builder = CdpConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.navigation_timeout);

        if let Some(path) = config.executable.clone().or_else(find_chrome) {
            debug!(path = %path.display(), "using chrome executable");
            builder = builder.chrome_executable(path);
        }

        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--lang=en-US,en")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        let cdp_config = builder
            .build()
            .map_err(|e| ToolHarvestError::Browser(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| ToolHarvestError::Browser(format!("failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            config: config.clone(),
        })
    }

    /// Close the browser process and stop the event loop.
    pub async fn shutdown(self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "browser did not close cleanly");
        }
        let _ = browser.wait().await;
        drop(browser);
        self.handler.abort();
        info!("browser closed");
    }

    async fn render_inner(
        &self,
        page: &Page,
        url: &str,
        opts: RenderOptions,
    ) -> Result<RenderedPage> {
        let cdp = |e: chromiumoxide::error::CdpError| ToolHarvestError::Browser(e.to_string());

        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(self.config.user_agent.clone())
            .accept_language("en")
            .build()
            .map_err(ToolHarvestError::Browser)?;
        page.execute(ua).await.map_err(cdp)?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(self.config.viewport_width),
            i64::from(self.config.viewport_height),
            1.0,
            false,
        ))
        .await
        .map_err(cdp)?;

        tokio::time::timeout(self.config.navigation_timeout, page.goto(url))
            .await
            .map_err(|_| {
                ToolHarvestError::Browser(format!(
                    "navigation timed out after {}s for {url}",
                    self.config.navigation_timeout.as_secs()
                ))
            })?
            .map_err(|e| ToolHarvestError::Browser(format!("navigation failed for {url}: {e}")))?;

        let status = match tokio::time::timeout(RESPONSE_WAIT, page.wait_for_navigation_response())
            .await
        {
            Ok(Ok(Some(request))) => request
                .response
                .as_ref()
                .and_then(|r| u16::try_from(r.status).ok()),
            _ => None,
        };
        debug!(url, ?status, "navigation finished");

        wait_for_page_ready(page, self.config.navigation_timeout).await;
        tokio::time::sleep(self.config.settle).await;

        let final_url = page
            .url()
            .await
            .map_err(cdp)?
            .unwrap_or_else(|| url.to_string());
        let html = page.content().await.map_err(cdp)?;
        let body_text: String = page
            .evaluate(BODY_TEXT_SCRIPT)
            .await
            .map_err(cdp)?
            .into_value()
            .unwrap_or_default();

        let screenshot_png = if opts.screenshot {
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .clip(Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: f64::from(self.config.viewport_width),
                    height: f64::from(self.config.viewport_height),
                    scale: 1.0,
                })
                .build();
            Some(page.screenshot(params).await.map_err(cdp)?)
        } else {
            None
        };

        Ok(RenderedPage {
            final_url,
            status,
            html,
            body_text,
            screenshot_png,
        })
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    #[instrument(skip_all, fields(url = %url))]
    async fn render(&self, url: &str, opts: RenderOptions) -> Result<RenderedPage> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| ToolHarvestError::Browser(format!("failed to open page: {e}")))?
        };

        let dialogs = match page.event_listener::<EventJavascriptDialogOpening>().await {
            Ok(mut events) => {
                let dialog_page = page.clone();
                Some(tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        debug!(message = %event.message, "accepting dialog");
                        let _ = dialog_page
                            .execute(HandleJavaScriptDialogParams::new(true))
                            .await;
                    }
                }))
            }
            Err(e) => {
                warn!(error = %e, "could not subscribe to dialog events");
                None
            }
        };

        // Inner call so the page is always reset and closed
        let result = self.render_inner(&page, url, opts).await;

        let _ = page.goto("about:blank").await;
        let _ = page.close().await;
        if let Some(task) = dialogs {
            task.abort();
        }
        result
    }
}

/// Wait for the document to reach a ready state.
async fn wait_for_page_ready(page: &Page, timeout: Duration) {
    match tokio::time::timeout(timeout, page.evaluate(WAIT_FOR_READY_SCRIPT)).await {
        Ok(Ok(result)) => {
            let state: String = result.into_value().unwrap_or_else(|_| "unknown".into());
            debug!(state, "page ready state");
        }
        Ok(Err(e)) => debug!(error = %e, "could not check ready state"),
        Err(_) => warn!("timeout waiting for page ready state"),
    }
}

fn find_chrome() -> Option<PathBuf> {
    CHROME_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
