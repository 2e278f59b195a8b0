//! 发票模块
//!
//! - [`InvoiceService`] 有界并发的批量开票
//! - [`adapters`] 渲染器与对象存储端口

pub mod adapters;
pub mod error;
pub mod service;

pub use adapters::{
    InvoiceDocumentRenderer, InvoiceStorage, LocalInvoiceStorage, MemoryInvoiceStorage,
    RenderError, StorageError, StorageObject, TextInvoiceRenderer,
};
pub use error::{InvoiceError, InvoiceResult};
pub use service::{
    InvoiceOrderFilter, InvoiceService, InvoiceServiceDeps, IssueInvoicesCommand,
    IssueInvoicesResult, IssuedInvoice,
};
