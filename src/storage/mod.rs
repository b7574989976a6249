//! Storage Module
//!
//! This module provides the core storage functionality for LineKV: an
//! in-memory string store with per-key TTLs, the background tasks that
//! enforce those TTLs, and JSON snapshot persistence.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │                  Store                   │
//! │   RwLock { values, expirations }         │
//! └──────────────────────────────────────────┘
//!        ▲                 ▲              │
//!        │                 │              ▼
//! ┌──────┴───────┐ ┌───────┴────────┐ ┌──────────┐
//! │ExpirySweeper │ │schedule_deletion│ │ Snapshot │
//! │ (interval)   │ │  (DELETEEX)     │ │  (JSON)  │
//! └──────────────┘ └─────────────────┘ └──────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use linekv::storage::Store;
//! use std::time::Duration;
//!
//! let store = Store::new();
//!
//! store.set("name", "Ariz");
//! assert_eq!(store.get("name"), Some("Ariz".to_string()));
//!
//! store.set_with_ttl("session", "token123", Duration::from_secs(3600));
//! assert!(store.persist("session"));
//! assert_eq!(store.ttl("session"), -1);
//! ```

pub mod clock;
pub mod engine;
pub mod expiry;
pub mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{RenameOutcome, Store, TTL_MISSING, TTL_NO_EXPIRY};
pub use expiry::{schedule_deletion, ExpiryConfig, ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_VERSION};
