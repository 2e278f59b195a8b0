//! 批量开票 Job

use async_trait::async_trait;

use super::{JobError, JobMessage, JobProcessor, JobResult};
use crate::invoicing::{InvoiceError, InvoiceService, IssueInvoicesCommand};

pub const INVOICE_TOPIC: &str = "invoices.issue";

pub struct InvoiceJobProcessor {
    service: InvoiceService,
}

impl InvoiceJobProcessor {
    pub fn new(service: InvoiceService) -> Self {
        Self { service }
    }
}

fn classify(err: InvoiceError) -> JobError {
    match err {
        InvoiceError::InvalidInput(_)
        | InvoiceError::Conflict(_)
        | InvoiceError::OrderNotFound(_)
        | InvoiceError::BatchNotFound(_) => JobError::Permanent(err.to_string()),
        other => JobError::Transient(other.to_string()),
    }
}

#[async_trait]
impl JobProcessor for InvoiceJobProcessor {
    async fn process(&self, message: &JobMessage) -> JobResult<()> {
        let mut cmd: IssueInvoicesCommand = message.decode_json()?;
        cmd.actor_id = cmd.actor_id.trim().to_string();
        if cmd.actor_id.is_empty() {
            return Err(JobError::Permanent("actorId is required".into()));
        }

        let result = self.service.issue_invoices(cmd).await.map_err(classify)?;
        tracing::info!(
            message_id = %message.id,
            job_id = %result.job_id,
            issued = result.summary.issued,
            failed = result.summary.failed,
            "batch issued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterError;
    use crate::db::InvoiceRepo;
    use crate::testing::{TestHarness, sample_order};
    use serde_json::json;

    fn message(payload: serde_json::Value) -> JobMessage {
        JobMessage::new("m1", serde_json::to_vec(&payload).unwrap()).with_topic(INVOICE_TOPIC)
    }

    #[test]
    fn test_error_classification() {
        assert!(classify(InvoiceError::InvalidInput("x".into())).is_permanent());
        assert!(classify(InvoiceError::OrderNotFound("x".into())).is_permanent());
        assert!(!classify(InvoiceError::RepositoryUnavailable("x".into())).is_permanent());
        assert!(!classify(InvoiceError::Counter(CounterError::Unavailable("x".into()))).is_permanent());
    }

    #[tokio::test]
    async fn test_missing_actor_is_permanent() {
        let harness = TestHarness::new();
        let processor = InvoiceJobProcessor::new(harness.invoice_service());
        let err = processor
            .process(&message(json!({"actorId": "  ", "orderIds": ["ord_1"]})))
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_issues_batch() {
        let harness = TestHarness::new();
        harness.seed_order(sample_order("ord_1", 5000)).await;
        let processor = InvoiceJobProcessor::new(harness.invoice_service());
        processor
            .process(&message(json!({"actorId": "admin", "orderIds": ["ord_1"]})))
            .await
            .unwrap();
        let invoices = harness.store.invoices();
        assert_eq!(invoices.find_by_order_id("ord_1").await.unwrap().len(), 1);
    }
}
