//! Block-driven batching and caching of read-only contract calls.
//!
//! Views subscribe to call signatures; on every new block the cache selects
//! the signatures that are due, the planner groups them into aggregated or
//! independent reads, and the fetcher executes them. Results are merged back
//! keyed by signature, higher block wins.

pub mod cache;
pub mod entry;
pub mod fetcher;
pub mod planner;
pub mod signature;

pub use cache::{CallCache, EntrySnapshot, FetchOutcome, Subscription, SubscriptionId};
pub use entry::{CacheEntry, CallResult, is_fresh_at};
pub use fetcher::{BatchOutcome, CallFetcher};
pub use planner::{BatchMode, CallBatch, DueCall, plan_batches};
pub use signature::CallSignature;
