//! Rendering-session engine for the listing source.
//!
//! Launches a Chromium session per scan with anti-automation countermeasures
//! applied, and exposes the page operations extraction needs behind the
//! [`BrowserActions`] and [`SessionLauncher`] seams.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;

pub use actions::{BrowserActions, LoadState, SessionLauncher};
pub use engine::{BrowserEngine, BrowserSession};
pub use error::{BrowserError, Result};
