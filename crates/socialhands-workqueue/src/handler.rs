//! Job handlers and their registry.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::error::QueueError;
use crate::job::{ErrorKind, Job, JobError, JobResult};

/// Failure raised by a job handler.
///
/// Only [`HandlerError::Transient`] is retried; every other variant fails
/// the job on the attempt that raised it.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// Timeout, rate limit, network hiccup or flaky navigation.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The platform session is missing or expired.
    #[error("Not authenticated on {0}; log in again")]
    NotAuthenticated(String),

    /// The payload can never succeed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The action cannot be carried out in this environment.
    #[error("Action failed: {0}")]
    Failed(String),

    /// Nothing is registered for the job's type.
    #[error("No handler registered for job type '{0}'")]
    NoHandler(String),
}

impl HandlerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_transient() {
            ErrorKind::Transient
        } else {
            ErrorKind::Terminal
        }
    }

    pub fn to_job_error(&self) -> JobError {
        JobError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// What a handler sees of the job it runs.
///
/// Values a handler picks for itself (a draft, a reply target) are pinned
/// here. The worker stores them in the payload before the next attempt, so
/// a retry acts on the same input.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job: Job,
    pinned: Arc<Mutex<Map<String, Value>>>,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            pinned: Arc::default(),
        }
    }

    /// Payload field `name`, or the value of `fallback` pinned under `name`.
    pub fn str_or_pin(
        &self,
        name: &str,
        fallback: impl FnOnce() -> Option<String>,
    ) -> Option<String> {
        if let Some(value) = self.optional_str(name) {
            return Some(value.to_string());
        }
        let value = fallback()?;
        self.pin(name, value.clone());
        Some(value)
    }

    /// Keep `value` as payload field `name` for later attempts.
    pub fn pin(&self, name: &str, value: impl Into<Value>) {
        self.pinned.lock().insert(name.to_string(), value.into());
    }

    /// Fields pinned during this attempt.
    pub fn pinned(&self) -> Map<String, Value> {
        self.pinned.lock().clone()
    }

    pub fn data(&self) -> &Value {
        &self.job.data
    }

    /// 1-based number of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.job.attempts
    }

    /// Required non-empty string field of the payload.
    pub fn str_field(&self, name: &str) -> Result<&str, HandlerError> {
        self.optional_str(name)
            .ok_or_else(|| HandlerError::InvalidInput(format!("missing field '{}'", name)))
    }

    /// Optional string field of the payload; blank strings count as absent.
    pub fn optional_str(&self, name: &str) -> Option<&str> {
        self.job
            .data
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Executes one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type tag this handler serves.
    fn job_type(&self) -> &str;

    /// Run one attempt.
    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError>;
}

/// Registry of handlers keyed by job type, built once at startup.
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler.
    ///
    /// Returns an error if the job type is already registered.
    pub fn register(&self, handler: Arc<dyn JobHandler>) -> Result<(), QueueError> {
        let job_type = handler.job_type().to_string();
        if self.handlers.contains_key(&job_type) {
            return Err(QueueError::InvalidJob(format!(
                "handler for '{}' already registered",
                job_type
            )));
        }
        self.handlers.insert(job_type, handler);
        Ok(())
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).map(|h| h.clone())
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|h| h.key().clone()).collect();
        types.sort();
        types
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl JobHandler for Echo {
        fn job_type(&self) -> &str {
            "echo"
        }

        async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
            Ok(JobResult::ok(ctx.str_field("text")?))
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        assert!(registry.contains("echo"));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("other").is_none());
        assert_eq!(registry.job_types(), vec!["echo"]);
    }

    #[test]
    fn test_register_duplicate() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        assert!(registry.register(Arc::new(Echo)).is_err());
    }

    #[test]
    fn test_error_kinds() {
        assert!(HandlerError::Transient("t".into()).is_transient());
        let err = HandlerError::NotAuthenticated("twitter".into()).to_job_error();
        assert_eq!(err.kind, ErrorKind::Terminal);
        assert!(err.message.contains("twitter"));
        assert_eq!(HandlerError::NoHandler("x".into()).kind(), ErrorKind::Terminal);
    }

    #[tokio::test]
    async fn test_str_field() {
        let ctx = JobContext::new(Job::new("echo", json!({"text": " hi ", "blank": "  "}), 0, 3));
        assert_eq!(Echo.handle(&ctx).await.unwrap().message, "hi");
        assert!(ctx.optional_str("blank").is_none());
        assert!(matches!(ctx.str_field("missing"), Err(HandlerError::InvalidInput(_))));
    }

    #[test]
    fn test_str_or_pin_prefers_payload() {
        let ctx = JobContext::new(Job::new("echo", json!({"text": "given"}), 0, 3));
        assert_eq!(ctx.str_or_pin("text", || Some("picked".into())).as_deref(), Some("given"));
        assert!(ctx.pinned().is_empty());

        let ctx = JobContext::new(Job::new("echo", json!({}), 0, 3));
        assert_eq!(ctx.str_or_pin("text", || Some("picked".into())).as_deref(), Some("picked"));
        assert_eq!(ctx.str_or_pin("other", || None), None);
        assert_eq!(ctx.pinned().get("text"), Some(&json!("picked")));
        assert_eq!(ctx.pinned().len(), 1);
    }
}
