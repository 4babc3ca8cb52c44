//! Google Contacts support for gws.
//!
//! Provides the People API client, the SQLite contact cache, and cursor-based
//! synchronization between the two.

pub mod cache;
pub mod client;
pub mod error;
pub mod sync;
pub mod types;

pub use cache::ContactCache;
pub use client::{ContactSource, PeopleClient};
pub use error::ContactsError;
pub use sync::ContactSyncer;
pub use types::{
    CacheStatus, ChangeCounts, ChangeListing, ChangePage, ContactChange, ContactEntry,
    ContactPage, FullSyncReason, SyncCursor, SyncMode, SyncReport,
};
