//! Redirect side effect: open a URL in a new browsing context.
//!
//! Fire-and-forget: failures are logged, never reported back to the
//! analysis flow. Targets come from model output, so every navigator the
//! hosts build is wrapped in [`WebOnly`].

use tracing::{info, warn};
use url::Url;

/// Receives redirect targets produced by an analysis.
pub trait Navigator {
    fn open(&mut self, url: &str);
}

/// Whether `target` is an absolute `http`/`https` URL with a host.
#[must_use]
pub fn is_web_url(target: &str) -> bool {
    Url::parse(target)
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty()))
}

/// Passes only web URLs to the inner navigator. Paths, `file:`,
/// `javascript:` and other schemes are refused.
pub struct WebOnly<N>(pub N);

impl<N: Navigator> Navigator for WebOnly<N> {
    fn open(&mut self, url: &str) {
        if is_web_url(url) {
            self.0.open(url);
        } else {
            warn!(%url, "redirect: refused non-web target");
        }
    }
}

/// Opens URLs in the system's default browser.
pub struct SystemBrowser;

impl Navigator for SystemBrowser {
    fn open(&mut self, url: &str) {
        match open::that_detached(url) {
            Ok(()) => info!(%url, "redirect: opened in browser"),
            Err(e) => warn!(%url, error = %e, "redirect: failed to open browser"),
        }
    }
}

/// Prints URLs to stdout instead of opening them.
pub struct PrintUrl;

impl Navigator for PrintUrl {
    fn open(&mut self, url: &str) {
        println!("{url}");
    }
}

#[cfg(test)]
#[path = "redirect_test.rs"]
mod tests;
