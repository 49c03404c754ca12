//! # tailoc-commerce: Inventory Ledger & Order Workflow
//!
//! The service layer of the Audio Tài Lộc store. Everything here is reached
//! through a [`CommerceContext`] built from an explicit [`CommerceConfig`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  tailoc-cli  ──►  CommerceContext::connect(config)                     │
//! │                          │                                              │
//! │         ┌────────────────┼────────────────────┐                         │
//! │         ▼                ▼                    ▼                         │
//! │  ┌──────────────┐ ┌────────────────┐ ┌─────────────────┐                │
//! │  │ProductCatalog│ │InventoryLedger │ │  OrderWorkflow  │                │
//! │  │ create / get │ │ adjust/reserve │ │ create / cancel │                │
//! │  │ list (cached)│ │ level (cached) │ │ history (cached)│                │
//! │  └──────┬───────┘ └───────┬────────┘ └────────┬────────┘                │
//! │         │                 │                   │                         │
//! │         ▼                 ▼                   ▼                         │
//! │   tailoc-cache     tailoc-db TransactionManager      EventBus           │
//! │   (tags, TTL)      (retry, timeout, rollback)        (broadcast)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tailoc_commerce::{CommerceConfig, CommerceContext};
//! use tailoc_core::OrderLine;
//!
//! let ctx = CommerceContext::connect(CommerceConfig::load(None)?).await?;
//!
//! ctx.inventory().adjust(&speaker_id, 5, "delivery").await?;
//! let order = ctx
//!     .orders()
//!     .create_order("user-42", &[OrderLine::new(speaker_id.clone(), 2)])
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod inventory;
pub mod orders;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::{ProductCatalog, ProductPage, MAX_PAGE_SIZE};
pub use config::CommerceConfig;
pub use context::CommerceContext;
pub use error::{CommerceError, CommerceResult};
pub use events::{DomainEvent, EventBus};
pub use inventory::InventoryLedger;
pub use orders::OrderWorkflow;
