//! Error types shared across the journal, collection and loading layers

use crate::index_cache::IndexError;
use crate::parser::LoadError;
use crate::query::QueryError;
use crate::transaction::XactId;

/// Errors raised by journal operations
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Indexed access outside the bounds of a sequence
    #[error(transparent)]
    Index(#[from] IndexError),

    /// A collection over this journal is still alive
    #[error("Cannot have multiple journal collections open at once")]
    CollectionOpen,

    /// The query or report arguments could not be understood
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The journal could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// No live account with that name or id
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account path with an empty segment
    #[error("Invalid account name: '{0}'")]
    InvalidAccountName(String),

    /// The root of the tree is permanent
    #[error("The master account cannot be removed")]
    RemoveMaster,

    /// Only leaf accounts can be removed
    #[error("Account {name} still has {children} child account(s)")]
    AccountHasChildren {
        /// Full name of the account
        name: String,
        /// Number of direct children
        children: usize,
    },

    /// Postings still refer to the account
    #[error("Account {name} is referenced by {postings} posting(s)")]
    AccountInUse {
        /// Full name of the account
        name: String,
        /// Number of postings referring to it
        postings: usize,
    },

    /// Transactions need at least one posting
    #[error("Transaction has no postings")]
    EmptyTransaction,

    /// Unknown transaction id
    #[error("Transaction {0} is not part of this journal")]
    TransactionNotFound(XactId),
}

/// Result alias for journal operations
pub type Result<T, E = JournalError> = std::result::Result<T, E>;
