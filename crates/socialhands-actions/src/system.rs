//! Handlers that do not touch a browser.

use async_trait::async_trait;
use tracing::info;

use socialhands_workqueue::{HandlerError, JobContext, JobHandler, JobResult, job_types};

/// Connectivity probe for the whole claim, run and finish path.
pub struct TestJobHandler;

#[async_trait]
impl JobHandler for TestJobHandler {
    fn job_type(&self) -> &str {
        job_types::TEST_JOB
    }

    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
        let message = ctx.optional_str("message").unwrap_or("pong");
        info!("Test job {} ran: {}", ctx.job.id, message);
        Ok(JobResult::ok(message))
    }
}

/// Acknowledges a remote request to start the agent.
pub struct StartAgentHandler;

#[async_trait]
impl JobHandler for StartAgentHandler {
    fn job_type(&self) -> &str {
        job_types::START_AGENT
    }

    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
        info!("Agent start requested by job {}", ctx.job.id);
        Ok(JobResult::ok("agent started"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::job;
    use serde_json::json;

    #[tokio::test]
    async fn test_test_job_echoes() {
        let result = TestJobHandler
            .handle(&job(job_types::TEST_JOB, json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(result.message, "hi");

        let result = TestJobHandler
            .handle(&job(job_types::TEST_JOB, json!({})))
            .await
            .unwrap();
        assert_eq!(result.message, "pong");
    }

    #[tokio::test]
    async fn test_start_agent() {
        let result = StartAgentHandler
            .handle(&job(job_types::START_AGENT, json!({})))
            .await
            .unwrap();
        assert!(result.success);
    }
}
