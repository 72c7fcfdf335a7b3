//! Page capture for toolharvest.
//!
//! Renders target pages in headless Chromium, extracts their text signal
//! through site adapters, and resolves favicons.

pub mod adapters;
mod capture;
mod chromium;
mod favicon;
pub mod imaging;
mod renderer;

pub use adapters::{AdapterRegistry, SiteAdapter};
pub use capture::{CaptureOutcome, CapturedContent, ContentCapture, soft_404_marker};
pub use chromium::ChromiumRenderer;
pub use favicon::{Favicon, FaviconResolver, FaviconSource};
pub use renderer::{PageRenderer, RenderOptions, RenderedPage};
