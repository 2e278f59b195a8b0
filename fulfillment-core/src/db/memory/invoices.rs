use async_trait::async_trait;

use shared::models::{Invoice, InvoiceBatchJob};

use super::{MemoryStore, paginate};
use crate::db::repository::{
    InvoiceBatchRepo, InvoiceRepo, Page, Pagination, RepoError, RepoResult,
};

#[derive(Debug, Clone)]
pub struct MemoryInvoiceRepo {
    store: MemoryStore,
}

impl MemoryInvoiceRepo {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl InvoiceRepo for MemoryInvoiceRepo {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Invoice>> {
        self.store.read(|t| t.invoices.get(id).cloned())
    }

    async fn find_by_order_id(&self, order_id: &str) -> RepoResult<Vec<Invoice>> {
        self.store.read(|t| {
            t.invoices
                .values()
                .filter(|inv| inv.order_id() == order_id)
                .cloned()
                .collect()
        })
    }

    async fn insert(&self, invoice: &Invoice) -> RepoResult<()> {
        self.store.write(|t| {
            if t.invoices.contains_key(&invoice.id) {
                return Err(RepoError::Conflict(format!(
                    "invoice {} already exists",
                    invoice.id
                )));
            }
            let order_id = invoice.order_id();
            if t.invoices.values().any(|inv| inv.order_id() == order_id) {
                return Err(RepoError::Conflict(format!(
                    "order {} already has an invoice",
                    order_id
                )));
            }
            t.invoices.insert(invoice.id.clone(), invoice.clone());
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemoryInvoiceBatchRepo {
    store: MemoryStore,
}

impl MemoryInvoiceBatchRepo {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl InvoiceBatchRepo for MemoryInvoiceBatchRepo {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<InvoiceBatchJob>> {
        self.store.read(|t| t.invoice_batches.get(id).cloned())
    }

    async fn list(&self, page: &Pagination) -> RepoResult<Page<InvoiceBatchJob>> {
        let mut items: Vec<InvoiceBatchJob> =
            self.store.read(|t| t.invoice_batches.values().cloned().collect())?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        paginate(items, page)
    }

    async fn insert(&self, job: &InvoiceBatchJob) -> RepoResult<()> {
        self.store.write(|t| {
            if t.invoice_batches.contains_key(&job.id) {
                return Err(RepoError::Conflict(format!(
                    "invoice batch {} already exists",
                    job.id
                )));
            }
            t.invoice_batches.insert(job.id.clone(), job.clone());
            Ok(())
        })
    }
}
