//! 发票渲染与存储适配器
//!
//! | 端口 | 实现 |
//! |------|------|
//! | [`InvoiceDocumentRenderer`] | [`TextInvoiceRenderer`] 纯文本票据 |
//! | [`InvoiceStorage`] | [`MemoryInvoiceStorage`], [`LocalInvoiceStorage`] (tokio::fs) |

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use shared::models::{Invoice, Order};

// ============================================================================
// Renderer
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(String),

    #[error("renderer unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait InvoiceDocumentRenderer: Send + Sync {
    async fn render_invoice(&self, order: &Order, invoice: &Invoice) -> Result<Vec<u8>, RenderError>;
}

/// 纯文本票据（UTF-8）
#[derive(Debug, Clone)]
pub struct TextInvoiceRenderer {
    width: usize,
}

impl Default for TextInvoiceRenderer {
    fn default() -> Self {
        Self { width: 48 }
    }
}

impl TextInvoiceRenderer {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(24),
        }
    }

    fn row(&self, out: &mut String, left: &str, right: &str) {
        let used = left.chars().count() + right.chars().count();
        let pad = self.width.saturating_sub(used).max(1);
        let _ = writeln!(out, "{}{}{}", left, " ".repeat(pad), right);
    }
}

#[async_trait]
impl InvoiceDocumentRenderer for TextInvoiceRenderer {
    async fn render_invoice(&self, order: &Order, invoice: &Invoice) -> Result<Vec<u8>, RenderError> {
        if invoice.invoice_number.trim().is_empty() {
            return Err(RenderError::Template("invoice number is empty".into()));
        }
        let rule = "=".repeat(self.width);
        let mut out = String::new();
        let _ = writeln!(out, "INVOICE {}", invoice.invoice_number);
        let _ = writeln!(out, "{}", rule);
        self.row(&mut out, "Order", &order.order_number);
        self.row(&mut out, "Issued", &shared::util::rfc3339_nano(&invoice.created_at));
        let _ = writeln!(out, "{}", "-".repeat(self.width));
        for item in &order.items {
            let label = item.name.as_deref().unwrap_or(&item.sku);
            self.row(
                &mut out,
                &format!("{} x{}", label, item.quantity),
                &(item.unit_price * item.quantity).to_string(),
            );
        }
        let _ = writeln!(out, "{}", "-".repeat(self.width));
        let totals = &order.totals;
        for (label, value) in [
            ("Subtotal", totals.subtotal),
            ("Discount", -totals.discount),
            ("Shipping", totals.shipping),
            ("Tax", totals.tax),
        ] {
            if value != 0 {
                self.row(&mut out, label, &value.to_string());
            }
        }
        self.row(
            &mut out,
            "TOTAL",
            &format!("{} {}", invoice.amount, invoice.currency.to_uppercase()),
        );
        let _ = writeln!(out, "{}", rule);
        if let Some(notes) = invoice.metadata.get("notes").and_then(|v| v.as_str()) {
            let _ = writeln!(out, "{}", notes);
        }
        Ok(out.into_bytes())
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage rejected object: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    pub path: String,
    pub content_type: String,
    pub payload: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait InvoiceStorage: Send + Sync {
    /// 返回资产引用
    async fn put(&self, object: StorageObject) -> Result<String, StorageError>;

    /// 删除 `put` 返回的资产；不存在时视为成功
    async fn delete(&self, asset_ref: &str) -> Result<(), StorageError>;
}

/// 内存对象存储，资产引用即路径
#[derive(Debug, Default)]
pub struct MemoryInvoiceStorage {
    objects: DashMap<String, StorageObject>,
}

impl MemoryInvoiceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<StorageObject> {
        self.objects.get(path).map(|o| o.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl InvoiceStorage for MemoryInvoiceStorage {
    async fn put(&self, object: StorageObject) -> Result<String, StorageError> {
        validate_object_path(&object.path)?;
        let path = object.path.clone();
        self.objects.insert(path.clone(), object);
        Ok(path)
    }

    async fn delete(&self, asset_ref: &str) -> Result<(), StorageError> {
        self.objects.remove(asset_ref);
        Ok(())
    }
}

/// 本地目录存储
#[derive(Debug, Clone)]
pub struct LocalInvoiceStorage {
    base_dir: PathBuf,
}

impl LocalInvoiceStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }
}

#[async_trait]
impl InvoiceStorage for LocalInvoiceStorage {
    async fn put(&self, object: StorageObject) -> Result<String, StorageError> {
        validate_object_path(&object.path)?;
        let target = self.resolve(&object.path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }
        tokio::fs::write(&target, &object.payload)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        tracing::debug!(path = %object.path, bytes = object.payload.len(), "Invoice stored");
        Ok(object.path)
    }

    async fn delete(&self, asset_ref: &str) -> Result<(), StorageError> {
        validate_object_path(asset_ref)?;
        match tokio::fs::remove_file(self.resolve(asset_ref)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }
}

/// 只允许相对路径，拒绝 `..`
fn validate_object_path(path: &str) -> Result<(), StorageError> {
    let p = Path::new(path);
    if path.trim().is_empty()
        || p.components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::Rejected(format!("invalid object path {}", path)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_order;
    use chrono::Utc;
    use shared::models::InvoiceStatus;

    fn object(path: &str) -> StorageObject {
        StorageObject {
            path: path.into(),
            content_type: "application/pdf".into(),
            payload: b"%PDF".to_vec(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_text_renderer_includes_number_and_total() {
        let order = sample_order("ord_1", 12000);
        let invoice = Invoice {
            id: "inv_a".into(),
            invoice_number: "INV-202505-000001".into(),
            order_ref: "/orders/ord_1".into(),
            status: InvoiceStatus::Issued,
            amount: 12000,
            currency: "jpy".into(),
            pdf_asset_ref: None,
            metadata: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let bytes = TextInvoiceRenderer::default()
            .render_invoice(&order, &invoice)
            .await
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("INVOICE INV-202505-000001"));
        assert!(text.contains("12000 JPY"));
    }

    #[tokio::test]
    async fn test_local_storage_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalInvoiceStorage::new(dir.path());
        let path = "assets/orders/ord_1/invoices/INV-1.pdf";
        let asset = storage.put(object(path)).await.unwrap();
        assert_eq!(asset, path);
        let written = tokio::fs::read(storage.resolve(path)).await.unwrap();
        assert_eq!(written, b"%PDF");

        storage.delete(&asset).await.unwrap();
        assert!(!storage.resolve(path).exists());
        // 重复删除不报错
        storage.delete(&asset).await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_rejects_escaping_paths() {
        let storage = MemoryInvoiceStorage::new();
        for bad in ["", "../etc/passwd", "/abs/path.pdf"] {
            assert!(matches!(
                storage.put(object(bad)).await,
                Err(StorageError::Rejected(_))
            ));
        }
        assert!(storage.is_empty());
    }
}
