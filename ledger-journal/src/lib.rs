//! Journal data model and query-driven posting collection for Ledger
//!
//! This crate provides the in-memory journal (a hierarchical account tree
//! and an ordered stream of transactions and their postings), amortized
//! positional access over forward-only sequences, and a collection pipeline
//! that turns a textual query into a chain of posting handlers and gathers
//! the postings that pass through it.

#![warn(clippy::all)]
#![warn(missing_docs)]

/// Module for amounts with commodity support
pub mod amount;

/// Module for hierarchical account structure
pub mod account;

/// Module for posting/entry representation
pub mod posting;

/// Module for transaction representation
pub mod transaction;

/// Module for amortized indexed access over forward-only sequences
pub mod index_cache;

/// Module for journal data structure
pub mod journal;

/// Module for journal file parsing using nom combinators
pub mod parser;

/// Module for the query language
pub mod query;

/// Module for posting filters
pub mod filters;

/// Module for post-handler chains
pub mod chain;

/// Module for report configuration and option processing
pub mod report;

/// Module for query-driven posting collection
pub mod collect;

/// Module for session defaults from the environment and init files
pub mod session;

/// Module for crate error types
pub mod error;

pub use account::{Account, AccountId, AccountTree};
pub use amount::Amount;
pub use collect::Collection;
pub use error::{JournalError, Result};
pub use index_cache::{ForwardSequence, IndexCache, IndexError};
pub use journal::Journal;
pub use posting::{Posting, PostingRef};
pub use session::Session;
pub use transaction::{Transaction, XactId};
