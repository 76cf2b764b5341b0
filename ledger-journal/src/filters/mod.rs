//! Composable posting filters
//!
//! Each filter decides on its own whether a posting belongs in a report; a
//! [`FilterChain`] passes a posting only when every filter accepts it. The
//! chain is wrapped into the handler pipeline by
//! [`FilterPosts`](crate::chain::FilterPosts).

use std::fmt;

use chrono::NaiveDate;

use crate::journal::Journal;
use crate::posting::{PostingRef, PostingStatus};
use crate::query::Predicate;

/// Core trait for posting filters
pub trait PostFilter: fmt::Debug {
    /// Check if a posting passes this filter
    fn matches(&self, journal: &Journal, post: PostingRef<'_>) -> bool;

    /// Get a description of this filter
    fn description(&self) -> String;
}

/// Composite filter chain that applies multiple filters
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn PostFilter>>,
}

impl FilterChain {
    /// Create a new empty filter chain
    pub fn new() -> Self {
        Self { filters: Vec::new() }
    }

    /// Add a filter to the chain
    pub fn add_filter(mut self, filter: Box<dyn PostFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a filter to the chain in place
    pub fn push(&mut self, filter: Box<dyn PostFilter>) {
        self.filters.push(filter);
    }

    /// Check if a posting passes all filters in the chain
    pub fn matches(&self, journal: &Journal, post: PostingRef<'_>) -> bool {
        self.filters.iter().all(|filter| filter.matches(journal, post))
    }

    /// Get descriptions of all filters
    pub fn descriptions(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.description()).collect()
    }

    /// Get the number of filters in the chain
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Postings matching a compiled query
#[derive(Debug, Clone)]
pub struct QueryFilter {
    predicate: Predicate,
}

impl QueryFilter {
    /// Wrap a compiled query
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate }
    }
}

impl PostFilter for QueryFilter {
    fn matches(&self, journal: &Journal, post: PostingRef<'_>) -> bool {
        self.predicate.matches(journal.accounts(), post)
    }

    fn description(&self) -> String {
        format!("query {}", self.predicate)
    }
}

/// Status filter for cleared/pending/uncleared postings
///
/// A posting without a status of its own takes its transaction's status.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    allowed_statuses: Vec<PostingStatus>,
}

impl StatusFilter {
    /// Create a new status filter
    pub fn new(statuses: Vec<PostingStatus>) -> Self {
        Self { allowed_statuses: statuses }
    }

    /// Create filter for cleared items only
    pub fn cleared_only() -> Self {
        Self::new(vec![PostingStatus::Cleared])
    }

    /// Create filter for pending items only
    pub fn pending_only() -> Self {
        Self::new(vec![PostingStatus::Pending])
    }

    /// Create filter excluding cleared items
    pub fn exclude_cleared() -> Self {
        Self::new(vec![PostingStatus::Pending, PostingStatus::Uncleared])
    }
}

impl PostFilter for StatusFilter {
    fn matches(&self, _journal: &Journal, post: PostingRef<'_>) -> bool {
        self.allowed_statuses.contains(&post.effective_status())
    }

    fn description(&self) -> String {
        let statuses: Vec<String> = self.allowed_statuses.iter().map(|s| format!("{:?}", s)).collect();
        format!("status in [{}]", statuses.join(", "))
    }
}

/// Drops virtual postings
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFilter;

impl PostFilter for RealFilter {
    fn matches(&self, _journal: &Journal, post: PostingRef<'_>) -> bool {
        post.post.is_real()
    }

    fn description(&self) -> String {
        "real postings only".to_string()
    }
}

/// Date range filter: the begin date is inclusive, the end date exclusive
#[derive(Debug, Clone)]
pub struct DateFilter {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    effective: bool,
}

impl DateFilter {
    /// Create a new date filter
    pub fn new(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self { start_date, end_date, effective: false }
    }

    /// Compare auxiliary dates where transactions have them
    pub fn effective(mut self, effective: bool) -> Self {
        self.effective = effective;
        self
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        if let Some(start) = self.start_date {
            if date < start {
                return false;
            }
        }

        if let Some(end) = self.end_date {
            if date >= end {
                return false;
            }
        }

        true
    }
}

impl PostFilter for DateFilter {
    fn matches(&self, _journal: &Journal, post: PostingRef<'_>) -> bool {
        let date = if self.effective { post.xact.effective_date() } else { post.xact.date };
        self.date_matches(date)
    }

    fn description(&self) -> String {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => format!("date from {} until {}", start, end),
            (Some(start), None) => format!("date >= {}", start),
            (None, Some(end)) => format!("date < {}", end),
            (None, None) => "no date filter".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::Posting;
    use crate::transaction::{Transaction, TransactionStatus};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn create_test_journal() -> Journal {
        let mut journal = Journal::new();
        let food = journal.add_account("Expenses:Food").unwrap();
        let budget = journal.add_account("Budget:Food").unwrap();
        let cash = journal.add_account("Assets:Cash").unwrap();

        let mut xact = Transaction::new(date(1, 15), "Market");
        xact.status = TransactionStatus::Cleared;
        xact.aux_date = Some(date(2, 1));
        xact.add_posting(Posting::new(food, None));
        xact.add_posting(Posting::new(budget, None).with_flags(crate::posting::PostingFlags::VIRTUAL));
        xact.add_posting(Posting::new(cash, None).with_status(PostingStatus::Pending));
        journal.add_xact(xact).unwrap();
        journal
    }

    fn apply(journal: &Journal, filter: &dyn PostFilter) -> Vec<bool> {
        journal.posts().map(|post| filter.matches(journal, post)).collect()
    }

    #[test]
    fn test_date_filter() {
        let journal = create_test_journal();
        assert_eq!(apply(&journal, &DateFilter::new(Some(date(1, 15)), None)), vec![true; 3]);
        assert_eq!(apply(&journal, &DateFilter::new(None, Some(date(1, 15)))), vec![false; 3]);
        assert_eq!(apply(&journal, &DateFilter::new(Some(date(1, 20)), None)), vec![false; 3]);
        let effective = DateFilter::new(Some(date(1, 20)), None).effective(true);
        assert_eq!(apply(&journal, &effective), vec![true; 3]);
    }

    #[test]
    fn test_status_filter() {
        let journal = create_test_journal();
        assert_eq!(apply(&journal, &StatusFilter::cleared_only()), vec![true, true, false]);
        assert_eq!(apply(&journal, &StatusFilter::pending_only()), vec![false, false, true]);
        assert_eq!(apply(&journal, &StatusFilter::exclude_cleared()), vec![false, false, true]);
    }

    #[test]
    fn test_real_and_query_filters() {
        let journal = create_test_journal();
        assert_eq!(apply(&journal, &RealFilter), vec![true, false, true]);
        let query = QueryFilter::new(Predicate::parse_str("food").unwrap());
        assert_eq!(apply(&journal, &query), vec![true, true, false]);
    }

    #[test]
    fn test_filter_chain() {
        let journal = create_test_journal();
        let chain = FilterChain::new()
            .add_filter(Box::new(QueryFilter::new(Predicate::parse_str("food").unwrap())))
            .add_filter(Box::new(RealFilter));
        assert_eq!(chain.len(), 2);
        let matched: Vec<bool> = journal.posts().map(|post| chain.matches(&journal, post)).collect();
        assert_eq!(matched, vec![true, false, false]);
        assert_eq!(chain.descriptions()[1], "real postings only");
        assert!(FilterChain::new().is_empty());
    }
}
