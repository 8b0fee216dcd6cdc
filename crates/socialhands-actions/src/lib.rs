//! # SocialHands Actions
//!
//! Browser automation routines, one [`JobHandler`] per job type.
//!
//! Routines lease a platform page from a
//! [`SessionProvider`](socialhands_browser::SessionProvider), bound every
//! wait by the configured navigation timeout and classify failures as
//! transient (retried) or terminal.

pub mod content;
pub mod env;
pub mod instagram;
pub mod ledger;
pub mod scrape;
pub mod system;
pub mod twitter;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use socialhands_workqueue::{HandlerRegistry, JobHandler, QueueError};

pub use content::{ConfigContentProvider, ContentProvider};
pub use env::{ActionEnv, browser_error};
pub use ledger::{LedgerEntry, PostLedger, content_hash};

/// Register a handler for every built-in job type.
pub fn register_all(registry: &HandlerRegistry, env: Arc<ActionEnv>) -> Result<(), QueueError> {
    let handlers: Vec<Arc<dyn JobHandler>> = vec![
        Arc::new(twitter::PostHandler::new(env.clone())),
        Arc::new(twitter::ReplyHandler::new(env.clone())),
        Arc::new(twitter::FollowHandler::new(env.clone())),
        Arc::new(twitter::SearchHandler::new(env.clone())),
        Arc::new(instagram::StoriesHandler::new(env.clone())),
        Arc::new(instagram::ReelsHandler::new(env.clone())),
        Arc::new(scrape::ScrapeHandler::new(env)),
        Arc::new(system::TestJobHandler),
        Arc::new(system::StartAgentHandler),
    ];
    for handler in handlers {
        registry.register(handler)?;
    }
    Ok(())
}
