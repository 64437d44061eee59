//! # rustscholarly
//!
//! Resilient Google Scholar retrieval with proxy rotation, abuse detection
//! and lazy pagination.
//!
//! ## Modules
//!
//! - [`proxy`] - Network paths and session rotation
//! - [`navigator`] - Retry loop, abuse detection, timeout escalation
//! - [`pagination`] - Lazy iteration over linked result pages
//! - [`publication`] / [`author`] - Record parsers
//! - [`scholarly`] - Search façade
//! - [`cookies`] - Cookie persistence
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustscholarly::{Scholarly, SearchOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scholarly = Scholarly::new();
//!     let mut results = scholarly.search_pubs("machine learning", &SearchOptions::default());
//!     while let Some(publication) = results.next().await? {
//!         println!("{}", publication.title());
//!     }
//!     Ok(())
//! }
//! ```

pub mod author;
pub mod cookies;
pub mod error;
pub mod html;
pub mod navigator;
pub mod pagination;
pub mod proxy;
pub mod publication;
pub mod scholarly;
pub mod types;

pub use error::{Result, ScholarError};
pub use navigator::{Navigator, NavigatorOptions, RetryPolicy};
pub use pagination::PageIterator;
pub use proxy::{PathDescriptor, SessionProvider};
pub use scholarly::{Scholarly, SearchOptions};
pub use types::{Author, AuthorSection, Publication};
