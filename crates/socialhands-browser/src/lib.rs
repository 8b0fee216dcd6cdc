//! # SocialHands Browser
//!
//! Drives a real Chrome over the DevTools Protocol.
//!
//! Automation routines talk to a [`BrowserPage`]; a [`SessionProvider`]
//! hands out one exclusive page per platform account at a time.

pub mod client;
pub mod error;
pub mod launcher;
pub mod page;
pub mod protocol;
pub mod session;

pub use client::{CdpClient, CdpPage};
pub use error::CdpError;
pub use launcher::ChromeLauncher;
pub use page::BrowserPage;
pub use session::{CdpSessionProvider, FixedSessionProvider, Platform, SessionLease, SessionProvider};
