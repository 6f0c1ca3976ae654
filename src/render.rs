use crate::error::ScanError;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Turns an HTML document into a PNG image.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ScanError>;

    /// Releases whatever the renderer holds between scans.
    async fn shutdown(&self) {}
}

/// Cleanup that runs even if the owning future is dropped mid-way: an armed
/// guard spawns it on drop, `disarm` hands it back to be awaited in place.
struct CleanupOnDrop<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    cleanup: Option<F>,
}

impl<F> CleanupOnDrop<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    fn disarm(mut self) -> Option<F> {
        self.cleanup.take()
    }
}

impl<F> Drop for CleanupOnDrop<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(cleanup);
            }
            Err(_) => tracing::debug!("No runtime left to run render cleanup"),
        }
    }
}

async fn close_page(page: chromiumoxide::Page) {
    if let Err(e) = page.close().await {
        tracing::debug!("Failed to close render page: {}", e);
    }
}

struct RunningBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Headless Chromium, launched on first use and shared by all render jobs
/// until `shutdown`.
pub struct ChromiumRenderer {
    args: Vec<String>,
    running: Mutex<Option<RunningBrowser>>,
}

impl std::fmt::Debug for ChromiumRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumRenderer")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl Default for ChromiumRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromiumRenderer {
    pub fn new() -> Self {
        let mut args = vec![
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--disable-extensions".to_string(),
        ];
        if std::env::var("CI").is_ok() || std::env::var("NO_SANDBOX").is_ok() {
            args.push("--no-sandbox".to_string());
        }
        Self {
            args,
            running: Mutex::new(None),
        }
    }

    async fn launch(&self) -> Result<RunningBrowser, ScanError> {
        let config = BrowserConfig::builder()
            .args(self.args.clone())
            .build()
            .map_err(ScanError::Render)?;
        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });
        tracing::info!("Launched headless browser for rendering");
        Ok(RunningBrowser { browser, handler })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ScanError> {
        let page = {
            let mut running = self.running.lock().await;
            if running.is_none() {
                *running = Some(self.launch().await?);
            }
            let Some(running) = running.as_ref() else {
                return Err(ScanError::Render("browser not running".to_string()));
            };
            running.browser.new_page("about:blank").await?
        };

        let guard = CleanupOnDrop::new(close_page(page.clone()));
        let image = async {
            page.set_content(html).await?;
            page.screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
        }
        .await;
        if let Some(close) = guard.disarm() {
            close.await;
        }
        Ok(image?)
    }

    async fn shutdown(&self) {
        let Some(mut running) = self.running.lock().await.take() else {
            return;
        };
        if let Err(e) = running.browser.close().await {
            tracing::warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = running.browser.wait().await {
            tracing::debug!("Browser process did not exit cleanly: {}", e);
        }
        running.handler.abort();
    }
}
