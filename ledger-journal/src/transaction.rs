//! Transaction representation

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::posting::{Posting, PostingRef};
use crate::query::{Predicate, QueryError};

/// Position information for source tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// File the entry was read from, absent for streamed input
    pub pathname: Option<PathBuf>,
    /// First line of the entry
    pub beg_line: usize,
    /// Last line of the entry
    pub end_line: usize,
}

/// Transaction status (state)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// Uncleared
    #[default]
    Uncleared,
    /// Cleared (*)
    Cleared,
    /// Pending (!)
    Pending,
}

/// Identifier the journal assigns to each transaction it stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct XactId(pub(crate) u64);

impl fmt::Display for XactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xact#{}", self.0)
    }
}

/// Represents a transaction (xact)
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Transaction date
    pub date: NaiveDate,
    /// Optional auxiliary/effective date
    pub aux_date: Option<NaiveDate>,
    /// Status (cleared, pending, etc.)
    pub status: TransactionStatus,
    /// Transaction code (optional identifier)
    pub code: Option<String>,
    /// Payee/description
    pub payee: String,
    /// Note/comment
    pub note: Option<String>,
    /// List of postings
    pub postings: Vec<Posting>,
    /// Metadata tags
    pub metadata: HashMap<String, Option<String>>,
    /// Source position information
    pub pos: Option<Position>,
    /// Assigned when the transaction is added to a journal
    pub(crate) id: Option<XactId>,
}

impl Transaction {
    /// Create a new transaction with required fields
    pub fn new(date: NaiveDate, payee: impl Into<String>) -> Self {
        Self {
            date,
            aux_date: None,
            status: TransactionStatus::default(),
            code: None,
            payee: payee.into(),
            note: None,
            postings: Vec::new(),
            metadata: HashMap::new(),
            pos: None,
            id: None,
        }
    }

    /// Add a posting to this transaction
    pub fn add_posting(&mut self, posting: Posting) {
        self.postings.push(posting);
    }

    /// Builder-style posting append
    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }

    /// Journal-assigned identifier, once the transaction has been added
    pub fn id(&self) -> Option<XactId> {
        self.id
    }

    /// Get the effective date (aux_date if present, otherwise date)
    pub fn effective_date(&self) -> NaiveDate {
        self.aux_date.unwrap_or(self.date)
    }

    /// Check if transaction has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.metadata.contains_key(tag)
    }

    /// Set a tag with optional value
    pub fn set_tag(&mut self, tag: impl Into<String>, value: Option<String>) {
        self.metadata.insert(tag.into(), value);
    }

    /// Postings paired with this transaction
    pub fn posts(&self) -> impl Iterator<Item = PostingRef<'_>> + '_ {
        self.postings.iter().map(move |post| PostingRef::new(self, post))
    }

    /// Get a description of this transaction
    pub fn description(&self) -> String {
        match &self.pos {
            Some(pos) => format!("transaction at line {}", pos.beg_line),
            None => "generated transaction".to_string(),
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date.format("%Y/%m/%d"), self.payee)
    }
}

/// An automated transaction: postings applied to every posting matching a query
#[derive(Debug, Clone)]
pub struct AutoTransaction {
    /// Query text as written after `=`
    pub query: String,
    /// Compiled form of `query`
    pub predicate: Predicate,
    /// Template postings
    pub postings: Vec<Posting>,
    /// Source position information
    pub pos: Option<Position>,
}

impl AutoTransaction {
    /// Compile `query` into an automated transaction with no postings yet
    pub fn new(query: impl Into<String>) -> Result<Self, QueryError> {
        let query = query.into();
        let predicate = Predicate::parse_str(&query)?;
        Ok(Self { query, predicate, postings: Vec::new(), pos: None })
    }

    /// Check whether this rule applies to a posting
    pub fn matches(&self, accounts: &crate::account::AccountTree, post: PostingRef<'_>) -> bool {
        self.predicate.matches(accounts, post)
    }
}

/// A periodic (budget) transaction
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodTransaction {
    /// Period expression as written after `~`
    pub period: String,
    /// Template postings
    pub postings: Vec<Posting>,
    /// Source position information
    pub pos: Option<Position>,
}

impl PeriodTransaction {
    /// Create a periodic transaction with no postings yet
    pub fn new(period: impl Into<String>) -> Self {
        Self { period: period.into(), postings: Vec::new(), pos: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountTree;
    use crate::amount::Amount;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_transaction_creation() {
        let xact = Transaction::new(date(2024, 1, 15), "Grocery Store");
        assert_eq!(xact.payee, "Grocery Store");
        assert_eq!(xact.status, TransactionStatus::Uncleared);
        assert!(xact.postings.is_empty());
        assert_eq!(xact.id(), None);
        assert_eq!(xact.to_string(), "2024/01/15 Grocery Store");
    }

    #[test]
    fn test_effective_date() {
        let mut xact = Transaction::new(date(2024, 1, 15), "Rent");
        assert_eq!(xact.effective_date(), date(2024, 1, 15));
        xact.aux_date = Some(date(2024, 2, 1));
        assert_eq!(xact.effective_date(), date(2024, 2, 1));
    }

    #[test]
    fn test_auto_transaction_matches() {
        let mut tree = AccountTree::new();
        let food = tree.find_account("Expenses:Food", true).unwrap();
        let cash = tree.find_account("Assets:Cash", true).unwrap();
        let xact = Transaction::new(date(2024, 1, 15), "Market")
            .with_posting(Posting::new(food, Some(Amount::new(Decimal::from(5)))))
            .with_posting(Posting::new(cash, None));

        let rule = AutoTransaction::new("expenses:food").unwrap();
        let matched: Vec<bool> = xact.posts().map(|post| rule.matches(&tree, post)).collect();
        assert_eq!(matched, vec![true, false]);

        assert!(AutoTransaction::new("(food").is_err());
    }
}
