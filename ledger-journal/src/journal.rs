//! Journal: the account tree plus every transaction read from the sources

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::slice;
use std::time::SystemTime;

use log::debug;
use regex::RegexBuilder;

use crate::account::{Account, AccountId, AccountTree};
use crate::error::{JournalError, Result};
use crate::index_cache::ForwardSequence;
use crate::parser;
use crate::posting::{Posting, PostingRef};
use crate::query::QueryError;
use crate::transaction::{AutoTransaction, PeriodTransaction, Transaction, XactId};

/// Provenance of one source the journal was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path of the file, absent for streamed input
    pub filename: Option<PathBuf>,
    /// Size in bytes at read time
    pub size: u64,
    /// Modification time at read time
    pub modtime: Option<SystemTime>,
    /// Input did not come from a named file
    pub from_stream: bool,
}

impl FileInfo {
    /// Describe a file on disk
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            filename: Some(path.to_path_buf()),
            size: metadata.len(),
            modtime: metadata.modified().ok(),
            from_stream: false,
        })
    }

    /// Describe text read from a stream
    pub fn from_stream(size: u64) -> Self {
        Self { filename: None, size, modtime: None, from_stream: true }
    }
}

/// Main journal structure
#[derive(Debug, Default)]
pub struct Journal {
    accounts: AccountTree,
    xacts: Vec<Transaction>,
    auto_xacts: Vec<AutoTransaction>,
    period_xacts: Vec<PeriodTransaction>,
    sources: Vec<FileInfo>,
    bucket: Option<AccountId>,
    was_loaded: bool,
    next_xact_id: u64,
    xdata_pending: Cell<bool>,
}

// A copy is a separate journal, so no collection over the original is open on it.
impl Clone for Journal {
    fn clone(&self) -> Self {
        Self {
            accounts: self.accounts.clone(),
            xacts: self.xacts.clone(),
            auto_xacts: self.auto_xacts.clone(),
            period_xacts: self.period_xacts.clone(),
            sources: self.sources.clone(),
            bucket: self.bucket,
            was_loaded: self.was_loaded,
            next_xact_id: self.next_xact_id,
            xdata_pending: Cell::new(false),
        }
    }
}

impl Journal {
    /// Create a new empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a journal and load `path` into it
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut journal = Self::new();
        journal.read(path)?;
        Ok(journal)
    }

    /// Load a journal file, returning the number of postings read
    pub fn read(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        Ok(parser::read(self, path.as_ref())?)
    }

    /// The account tree
    pub fn accounts(&self) -> &AccountTree {
        &self.accounts
    }

    /// The account tree, for edits such as account notes
    pub fn accounts_mut(&mut self) -> &mut AccountTree {
        &mut self.accounts
    }

    /// The master account
    pub fn master(&self) -> AccountId {
        self.accounts.master()
    }

    /// Get an account by id
    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Full colon-separated name of an account
    pub fn account_name(&self, id: AccountId) -> Option<String> {
        self.accounts.fullname(id)
    }

    /// Create (or return) the account at `path` below the master account
    pub fn add_account(&mut self, path: &str) -> Result<AccountId> {
        let id = self.accounts.add_child(self.accounts.master(), path)?;
        debug!("added account {} as {}", path, id);
        Ok(id)
    }

    /// Remove a leaf account with no postings
    pub fn remove_account(&mut self, id: AccountId) -> Result<Account> {
        let account = self.accounts.remove(id)?;
        if self.bucket == Some(id) {
            debug!("bucket account {} removed, clearing bucket", id);
            self.bucket = None;
        }
        Ok(account)
    }

    /// Find an account by full name, optionally creating it
    pub fn find_account(&mut self, path: &str, auto_create: bool) -> Option<AccountId> {
        self.accounts.find_account(path, auto_create)
    }

    /// First account whose full name matches `pattern`, case-insensitively
    pub fn find_account_re(&self, pattern: &str) -> Result<Option<AccountId>, QueryError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| QueryError::InvalidPattern { pattern: pattern.to_string(), source })?;
        Ok(self.accounts.find_account_re(&regex))
    }

    /// Default account for postings that name none
    pub fn bucket(&self) -> Option<AccountId> {
        self.bucket
    }

    /// Set or clear the default account
    pub fn set_bucket(&mut self, bucket: Option<AccountId>) -> Result<()> {
        if let Some(id) = bucket {
            if !self.accounts.contains(id) {
                return Err(JournalError::AccountNotFound(id.to_string()));
            }
        }
        self.bucket = bucket;
        Ok(())
    }

    /// Append a transaction to the master sequence
    pub fn add_xact(&mut self, mut xact: Transaction) -> Result<XactId> {
        self.check_postings(&xact.postings)?;
        for post in &xact.postings {
            self.accounts.register_post(post.account);
        }

        let id = XactId(self.next_xact_id);
        self.next_xact_id += 1;
        xact.id = Some(id);
        debug!("added {} ({}) with {} posting(s)", id, xact.payee, xact.postings.len());
        self.xacts.push(xact);
        Ok(id)
    }

    /// Remove a transaction, keeping the order of the others
    pub fn remove_xact(&mut self, id: XactId) -> Result<Transaction> {
        let pos = self
            .xacts
            .iter()
            .position(|xact| xact.id == Some(id))
            .ok_or(JournalError::TransactionNotFound(id))?;
        let mut xact = self.xacts.remove(pos);
        for post in &xact.postings {
            self.accounts.release_post(post.account);
        }
        xact.id = None;
        debug!("removed {} ({})", id, xact.payee);
        Ok(xact)
    }

    /// Register an automated transaction
    pub fn add_auto_xact(&mut self, xact: AutoTransaction) -> Result<()> {
        self.check_accounts(&xact.postings)?;
        for post in &xact.postings {
            self.accounts.register_post(post.account);
        }
        debug!("added automated transaction '{}'", xact.query);
        self.auto_xacts.push(xact);
        Ok(())
    }

    /// Register a periodic transaction
    pub fn add_period_xact(&mut self, xact: PeriodTransaction) -> Result<()> {
        self.check_accounts(&xact.postings)?;
        for post in &xact.postings {
            self.accounts.register_post(post.account);
        }
        debug!("added periodic transaction '{}'", xact.period);
        self.period_xacts.push(xact);
        Ok(())
    }

    /// Number of regular transactions
    pub fn len(&self) -> usize {
        self.xacts.len()
    }

    /// Check whether the journal holds no regular transactions
    pub fn is_empty(&self) -> bool {
        self.xacts.is_empty()
    }

    /// Regular transactions in order of addition
    pub fn xacts(&self) -> &[Transaction] {
        &self.xacts
    }

    /// Automated transactions in order of addition
    pub fn auto_xacts(&self) -> &[AutoTransaction] {
        &self.auto_xacts
    }

    /// Periodic transactions in order of addition
    pub fn period_xacts(&self) -> &[PeriodTransaction] {
        &self.period_xacts
    }

    /// Sources the journal was read from
    pub fn sources(&self) -> &[FileInfo] {
        &self.sources
    }

    /// Whether any source has been loaded
    pub fn was_loaded(&self) -> bool {
        self.was_loaded
    }

    /// The master sequence as an indexable forward sequence
    pub fn transactions(&self) -> Transactions<'_> {
        Transactions { xacts: &self.xacts }
    }

    /// Every posting of every regular transaction, in journal order
    pub fn posts(&self) -> JournalPosts<'_> {
        JournalPosts { xacts: self.xacts.iter(), current: None }
    }

    /// Whether a collection currently holds extended data on this journal
    pub fn has_xdata(&self) -> bool {
        self.xdata_pending.get()
    }

    /// Drop the extended-data marker
    pub fn clear_xdata(&self) {
        self.xdata_pending.set(false);
    }

    pub(crate) fn mark_xdata(&self) {
        self.xdata_pending.set(true);
    }

    pub(crate) fn add_source(&mut self, info: FileInfo) {
        self.sources.push(info);
        self.was_loaded = true;
    }

    /// Consistency check of the whole journal
    pub fn valid(&self) -> bool {
        if !self.accounts.valid() {
            debug!("journal account tree failed validation");
            return false;
        }

        if let Some(bucket) = self.bucket {
            if !self.accounts.contains(bucket) {
                debug!("journal bucket {} is not a live account", bucket);
                return false;
            }
        }

        let mut refs: HashMap<AccountId, usize> = HashMap::new();
        for xact in &self.xacts {
            if xact.postings.is_empty() {
                debug!("{} has no postings", xact.description());
                return false;
            }
        }
        let all_posts = self
            .xacts
            .iter()
            .flat_map(|xact| xact.postings.iter())
            .chain(self.auto_xacts.iter().flat_map(|xact| xact.postings.iter()))
            .chain(self.period_xacts.iter().flat_map(|xact| xact.postings.iter()));
        for post in all_posts {
            if !self.accounts.contains(post.account) {
                debug!("posting refers to missing account {}", post.account);
                return false;
            }
            *refs.entry(post.account).or_default() += 1;
        }

        for account in self.accounts.iter() {
            let expected = refs.get(&account.id()).copied().unwrap_or(0);
            if account.post_count() != expected {
                debug!(
                    "account {} counts {} posting(s), journal holds {}",
                    account.id(),
                    account.post_count(),
                    expected
                );
                return false;
            }
        }
        true
    }

    fn check_postings(&self, postings: &[Posting]) -> Result<()> {
        if postings.is_empty() {
            return Err(JournalError::EmptyTransaction);
        }
        self.check_accounts(postings)
    }

    fn check_accounts(&self, postings: &[Posting]) -> Result<()> {
        match postings.iter().find(|post| !self.accounts.contains(post.account)) {
            Some(post) => Err(JournalError::AccountNotFound(post.account.to_string())),
            None => Ok(()),
        }
    }
}

/// The journal's master transaction sequence
#[derive(Debug, Clone, Copy)]
pub struct Transactions<'j> {
    xacts: &'j Vec<Transaction>,
}

impl<'j> ForwardSequence<'j> for Transactions<'j> {
    type Item = &'j Transaction;
    type Iter = slice::Iter<'j, Transaction>;

    fn identity(&self) -> usize {
        self.xacts as *const Vec<Transaction> as usize
    }

    fn len(&self) -> usize {
        self.xacts.len()
    }

    fn walk(&self) -> Self::Iter {
        self.xacts.iter()
    }
}

/// Iterator over every posting of a journal
#[derive(Debug, Clone)]
pub struct JournalPosts<'j> {
    xacts: slice::Iter<'j, Transaction>,
    current: Option<(&'j Transaction, slice::Iter<'j, Posting>)>,
}

impl<'j> Iterator for JournalPosts<'j> {
    type Item = PostingRef<'j>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((xact, posts)) = self.current.as_mut() {
                if let Some(post) = posts.next() {
                    return Some(PostingRef::new(*xact, post));
                }
            }
            let xact = self.xacts.next()?;
            self.current = Some((xact, xact.postings.iter()));
        }
    }
}
