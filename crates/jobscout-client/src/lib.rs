pub mod guard;
pub mod http_browser;

#[cfg(feature = "browser")]
pub mod chromium_browser;

pub use http_browser::HttpBrowser;

#[cfg(feature = "browser")]
pub use chromium_browser::ChromiumBrowser;
