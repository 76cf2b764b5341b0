//! Query-driven posting collection
//!
//! [`Journal::collect`] turns a textual query into a report, walks every
//! posting of the journal through the report's handler chain and keeps the
//! postings that come out the other end. While the resulting [`Collection`]
//! is alive the journal is marked as holding extended data, and a second
//! collection over the same journal is refused.

use log::debug;

use crate::chain::{pass_down_posts, CollectPosts, PostChain};
use crate::error::{JournalError, Result};
use crate::index_cache::{normalize_index, IndexError};
use crate::journal::Journal;
use crate::posting::PostingRef;
use crate::query::{split_arguments, QueryError};
use crate::report::{process_arguments, Report};
use crate::session::Session;

const WHENCE: &str = "Journal::collect";

/// Marks a journal as holding extended data until dropped
#[derive(Debug)]
pub struct XdataGuard<'j> {
    journal: &'j Journal,
}

impl<'j> XdataGuard<'j> {
    /// Mark `journal`, or fail if it is already marked
    pub fn acquire(journal: &'j Journal) -> Result<Self> {
        if journal.has_xdata() {
            return Err(JournalError::CollectionOpen);
        }
        journal.mark_xdata();
        Ok(Self { journal })
    }
}

impl Drop for XdataGuard<'_> {
    fn drop(&mut self) {
        self.journal.clear_xdata();
    }
}

/// The postings selected by one query, in journal order
#[derive(Debug)]
pub struct Collection<'j> {
    journal: &'j Journal,
    report: Report<'j>,
    chain: PostChain<'j, CollectPosts<'j>>,
    _guard: XdataGuard<'j>,
}

impl<'j> Collection<'j> {
    fn build<F>(journal: &'j Journal, query: &str, make_report: F) -> Result<Self>
    where
        F: FnOnce(&'j Journal) -> std::result::Result<Report<'j>, QueryError>,
    {
        let guard = XdataGuard::acquire(journal)?;
        let mut report = make_report(journal).map_err(|err| err.context(WHENCE))?;

        let args = split_arguments(query);
        let remaining = process_arguments(&args, &mut report).map_err(|err| err.context(WHENCE))?;
        report.normalize_options("register").map_err(|err| err.context(WHENCE))?;
        report.parse_query_args(&remaining, WHENCE)?;

        let mut chain = report.chain_post_handlers(CollectPosts::new());
        pass_down_posts(&mut chain, journal.posts())?;
        debug!("collected {} posting(s) for query '{}'", chain.sink().len(), query);

        Ok(Self { journal, report, chain, _guard: guard })
    }

    /// The journal the postings belong to
    pub fn journal(&self) -> &'j Journal {
        self.journal
    }

    /// The report the collection was built from
    pub fn report(&self) -> &Report<'j> {
        &self.report
    }

    /// Number of postings collected
    pub fn len(&self) -> usize {
        self.chain.sink().len()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.chain.sink().is_empty()
    }

    /// Posting at `index`; negative indices count from the end
    pub fn get(&self, index: i64) -> Result<PostingRef<'j>> {
        let pos = normalize_index(index, self.len())?;
        self.chain
            .sink()
            .get(pos)
            .ok_or(JournalError::Index(IndexError { index, len: self.len() }))
    }

    /// Collected postings in journal order
    pub fn iter(&self) -> impl Iterator<Item = PostingRef<'j>> + '_ {
        self.chain.sink().iter()
    }

    /// Collected postings as a slice
    pub fn posts(&self) -> &[PostingRef<'j>] {
        self.chain.sink().posts()
    }
}

impl<'c, 'j> IntoIterator for &'c Collection<'j> {
    type Item = PostingRef<'j>;
    type IntoIter = std::iter::Copied<std::slice::Iter<'c, PostingRef<'j>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.posts().iter().copied()
    }
}

impl Journal {
    /// Collect the postings matching `query`
    ///
    /// `query` holds report options followed by query terms, as on a command
    /// line: `"--begin 2024-01-01 expenses and not @market"`.
    ///
    /// ```
    /// use ledger_journal::Journal;
    ///
    /// let mut journal = Journal::new();
    /// ledger_journal::parser::read_str(&mut journal, "\
    /// 2024/01/02 Market
    ///     Expenses:Food    $12
    ///     Assets:Cash
    /// ").unwrap();
    ///
    /// let collection = journal.collect("food").unwrap();
    /// assert_eq!(collection.len(), 1);
    /// assert!(journal.collect("food").is_err());
    /// drop(collection);
    /// assert!(!journal.has_xdata());
    /// ```
    pub fn collect(&self, query: &str) -> Result<Collection<'_>> {
        Collection::build(self, query, |journal| Ok(Report::new(journal)))
    }
}

impl Session {
    /// Collect from `journal`, applying this session's default options first
    pub fn collect<'j>(&self, journal: &'j Journal, query: &str) -> Result<Collection<'j>> {
        Collection::build(journal, query, |journal| Report::with_session(journal, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read_str;

    fn create_test_journal() -> Journal {
        let mut journal = Journal::new();
        read_str(
            &mut journal,
            "\
2024/01/01 * Market
    Expenses:Food      $10
    Assets:Cash

2024/01/05 Cinema
    Expenses:Fun       $12
    Assets:Cash

2024/01/09 * Bakery
    Expenses:Food      $4
    Assets:Cash
",
        )
        .unwrap();
        journal
    }

    fn payees(collection: &Collection<'_>) -> Vec<String> {
        collection.iter().map(|post| post.xact.payee.clone()).collect()
    }

    #[test]
    fn test_collect_query() {
        let journal = create_test_journal();
        let collection = journal.collect("food").unwrap();
        assert_eq!(payees(&collection), vec!["Market", "Bakery"]);
        assert_eq!(collection.get(-1).unwrap().xact.payee, "Bakery");
        assert!(matches!(collection.get(2), Err(JournalError::Index(_))));
        assert_eq!(collection.report().options().listing, Some(crate::report::ListingStyle::Register));
    }

    #[test]
    fn test_collect_everything() {
        let journal = create_test_journal();
        let collection = journal.collect("").unwrap();
        assert_eq!(collection.len(), 6);
        assert_eq!((&collection).into_iter().count(), 6);
    }

    #[test]
    fn test_collect_options() {
        let journal = create_test_journal();
        let collection = journal.collect("-C --begin 2024/01/02 expenses").unwrap();
        assert_eq!(payees(&collection), vec!["Bakery"]);
        drop(collection);

        let collection = journal.collect("--head 1 cash").unwrap();
        assert_eq!(payees(&collection), vec!["Market"]);
    }

    #[test]
    fn test_guard_lifecycle() {
        let journal = create_test_journal();
        {
            let _collection = journal.collect("food").unwrap();
            assert!(journal.has_xdata());
            assert!(matches!(journal.collect("fun"), Err(JournalError::CollectionOpen)));
            assert!(journal.has_xdata());
        }
        assert!(!journal.has_xdata());
        assert_eq!(journal.collect("fun").unwrap().len(), 1);
    }

    #[test]
    fn test_guard_released_on_error() {
        let journal = create_test_journal();
        let err = journal.collect("(food").unwrap_err();
        assert!(err.to_string().starts_with("Journal::collect: "));
        assert!(!journal.has_xdata());

        assert!(matches!(journal.collect("--nope"), Err(JournalError::Query(_))));
        assert!(!journal.has_xdata());
    }

    #[test]
    fn test_clone_of_marked_journal_is_unmarked() {
        let journal = create_test_journal();
        let collection = journal.collect("food").unwrap();
        let copy = journal.clone();
        assert!(!copy.has_xdata());
        drop(collection);
        assert_eq!(copy.collect("food").unwrap().len(), 2);
        assert!(!copy.has_xdata());
        assert!(!journal.has_xdata());
    }

    #[test]
    fn test_session_defaults_apply() {
        let journal = create_test_journal();
        let session = Session::from_vars([("LEDGER_CLEARED", "true")]).unwrap();
        let collection = session.collect(&journal, "expenses").unwrap();
        assert_eq!(payees(&collection), vec!["Market", "Bakery"]);
        assert!(session.collect(&journal, "expenses").is_err());
    }
}
