//! Posting/entry representation within transactions

use std::collections::HashMap;

use crate::account::AccountId;
use crate::amount::Amount;
use crate::transaction::{Transaction, TransactionStatus};

bitflags::bitflags! {
    /// Posting flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PostingFlags: u16 {
        /// Account specified with (parens)
        const VIRTUAL = 0x0010;
        /// Account specified with [brackets]
        const MUST_BALANCE = 0x0020;
        /// Amount was not given in the source
        const CALCULATED = 0x0040;
    }
}

/// Posting status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostingStatus {
    /// Uncleared
    #[default]
    Uncleared,
    /// Cleared (*)
    Cleared,
    /// Pending (!)
    Pending,
}

/// Represents a posting (line item) within a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Account this posting is made against
    pub account: AccountId,
    /// Amount posted, absent when it is left for balancing
    pub amount: Option<Amount>,
    /// Per-unit or total cost (`@` / `@@`)
    pub cost: Option<Amount>,
    /// Posting state
    pub status: PostingStatus,
    /// Posting flags
    pub flags: PostingFlags,
    /// Trailing comment
    pub note: Option<String>,
    /// Tags and `key: value` metadata
    pub metadata: HashMap<String, Option<String>>,
}

impl Posting {
    /// Create a posting against `account`
    pub fn new(account: AccountId, amount: Option<Amount>) -> Self {
        let flags = if amount.is_none() { PostingFlags::CALCULATED } else { PostingFlags::empty() };
        Self {
            account,
            amount,
            cost: None,
            status: PostingStatus::Uncleared,
            flags,
            note: None,
            metadata: HashMap::new(),
        }
    }

    /// Builder-style status setter
    pub fn with_status(mut self, status: PostingStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder-style note setter
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Builder-style cost setter
    pub fn with_cost(mut self, cost: Amount) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Builder-style flag setter
    pub fn with_flags(mut self, flags: PostingFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Attach a tag or metadata value
    pub fn set_tag(&mut self, name: impl Into<String>, value: Option<String>) {
        self.metadata.insert(name.into(), value);
    }

    /// Check if posting has a specific tag
    pub fn has_tag(&self, name: &str) -> bool {
        self.metadata.contains_key(name)
    }

    /// Value of a tag, if it was given one
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).and_then(|value| value.as_deref())
    }

    /// Whether this posting is virtual (parenthesized or bracketed)
    pub fn is_virtual(&self) -> bool {
        self.flags.intersects(PostingFlags::VIRTUAL | PostingFlags::MUST_BALANCE)
    }

    /// Whether this posting affects real balances
    pub fn is_real(&self) -> bool {
        !self.is_virtual()
    }
}

/// A posting together with its owning transaction
#[derive(Debug, Clone, Copy)]
pub struct PostingRef<'j> {
    /// Owning transaction
    pub xact: &'j Transaction,
    /// The posting itself
    pub post: &'j Posting,
}

impl<'j> PostingRef<'j> {
    /// Pair a posting with its transaction
    pub fn new(xact: &'j Transaction, post: &'j Posting) -> Self {
        Self { xact, post }
    }

    /// Account the posting is made against
    pub fn account(&self) -> AccountId {
        self.post.account
    }

    /// Status in effect for this posting: its own if set, else the transaction's
    pub fn effective_status(&self) -> PostingStatus {
        match self.post.status {
            PostingStatus::Uncleared => match self.xact.status {
                TransactionStatus::Uncleared => PostingStatus::Uncleared,
                TransactionStatus::Cleared => PostingStatus::Cleared,
                TransactionStatus::Pending => PostingStatus::Pending,
            },
            status => status,
        }
    }

    /// Tag lookup falling back to the transaction's metadata
    pub fn tag(&self, name: &str) -> Option<Option<&'j str>> {
        self.post
            .metadata
            .get(name)
            .or_else(|| self.xact.metadata.get(name))
            .map(|value| value.as_deref())
    }

    /// Identity comparison: both refer to the very same posting
    pub fn same_as(&self, other: &PostingRef<'_>) -> bool {
        std::ptr::eq(self.post, other.post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountTree;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    #[test]
    fn test_posting_creation() {
        let mut tree = AccountTree::new();
        let cash = tree.find_account("Assets:Cash", true).unwrap();
        let amount = Amount::with_commodity(Decimal::from(100), "$");
        let posting = Posting::new(cash, Some(amount.clone()));

        assert_eq!(posting.account, cash);
        assert_eq!(posting.amount, Some(amount));
        assert!(posting.flags.is_empty());
        assert!(posting.is_real());

        let elided = Posting::new(cash, None);
        assert!(elided.flags.contains(PostingFlags::CALCULATED));
    }

    #[test]
    fn test_posting_tags() {
        let mut tree = AccountTree::new();
        let cash = tree.find_account("Assets:Cash", true).unwrap();
        let mut posting = Posting::new(cash, None);
        posting.set_tag("Receipt", Some("1234".to_string()));
        posting.set_tag("reviewed", None);

        assert!(posting.has_tag("reviewed"));
        assert_eq!(posting.tag_value("Receipt"), Some("1234"));
        assert_eq!(posting.tag_value("reviewed"), None);
    }

    #[test]
    fn test_builder_note_and_cost() {
        let mut tree = AccountTree::new();
        let broker = tree.find_account("Assets:Broker", true).unwrap();
        let cost = Amount::with_commodity(Decimal::from(1500), "$");
        let posting = Posting::new(broker, Some(Amount::with_commodity(Decimal::from(10), "AAPL")))
            .with_cost(cost.clone())
            .with_note("quarterly buy");

        assert_eq!(posting.cost, Some(cost));
        assert_eq!(posting.note.as_deref(), Some("quarterly buy"));
    }

    #[test]
    fn test_tag_falls_back_to_transaction() {
        let mut tree = AccountTree::new();
        let cash = tree.find_account("Assets:Cash", true).unwrap();
        let mut xact = Transaction::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "Shop");
        xact.set_tag("project", Some("kitchen".to_string()));
        xact.set_tag("Receipt", Some("xact".to_string()));
        let mut posting = Posting::new(cash, None);
        posting.set_tag("Receipt", Some("1234".to_string()));
        posting.set_tag("reviewed", None);
        xact.add_posting(posting);

        let post = PostingRef::new(&xact, &xact.postings[0]);
        assert_eq!(post.tag("Receipt"), Some(Some("1234")));
        assert_eq!(post.tag("project"), Some(Some("kitchen")));
        assert_eq!(post.tag("reviewed"), Some(None));
        assert_eq!(post.tag("missing"), None);
    }

    #[test]
    fn test_effective_status_inherits_from_transaction() {
        let mut tree = AccountTree::new();
        let cash = tree.find_account("Assets:Cash", true).unwrap();
        let mut xact = Transaction::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "Shop");
        xact.status = TransactionStatus::Cleared;
        xact.add_posting(Posting::new(cash, None));
        xact.add_posting(Posting::new(cash, None).with_status(PostingStatus::Pending));

        let first = PostingRef::new(&xact, &xact.postings[0]);
        let second = PostingRef::new(&xact, &xact.postings[1]);
        assert_eq!(first.effective_status(), PostingStatus::Cleared);
        assert_eq!(second.effective_status(), PostingStatus::Pending);
        assert!(first.same_as(&first));
        assert!(!first.same_as(&second));
    }
}
