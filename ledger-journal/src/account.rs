//! Hierarchical account structure with parent-child relationships
//!
//! Accounts live in an arena owned by [`AccountTree`]. Each account records
//! its parent and an insertion-ordered map of named children, and is addressed
//! everywhere else (postings, the journal bucket) by a stable [`AccountId`].
//! The root of every tree is the unnamed master account.

use std::collections::HashSet;
use std::fmt;

use compact_str::CompactString;
use indexmap::IndexMap;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::index_cache::ForwardSequence;

/// Separator between the segments of a full account name
pub const ACCOUNT_SEPARATOR: char = ':';

/// Stable identifier of an account within one [`AccountTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(usize);

impl AccountId {
    /// Position of the account in its tree's arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node in the account hierarchy
#[derive(Debug, Clone)]
pub struct Account {
    /// Identifier of this account
    id: AccountId,
    /// Account name (without path)
    name: CompactString,
    /// Parent account, absent only for the master account
    parent: Option<AccountId>,
    /// Child accounts keyed by name, in creation order
    children: IndexMap<CompactString, AccountId>,
    /// Depth in the hierarchy (0 for the master account)
    depth: usize,
    /// Optional account note/description
    note: Option<String>,
    /// Number of postings currently referring to this account
    post_count: usize,
}

impl Account {
    fn new(id: AccountId, name: CompactString, parent: Option<AccountId>, depth: usize) -> Self {
        Self {
            id,
            name,
            parent,
            children: IndexMap::new(),
            depth,
            note: None,
            post_count: 0,
        }
    }

    /// Identifier of this account
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// The account's simple name (without path)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent account, if any
    pub fn parent(&self) -> Option<AccountId> {
        self.parent
    }

    /// Depth in the hierarchy
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Check if this is the master (root) account
    pub fn is_master(&self) -> bool {
        self.parent.is_none()
    }

    /// Get the number of child accounts
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Check if this account is a leaf (has no children)
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Look up a direct child by name
    pub fn child(&self, name: &str) -> Option<AccountId> {
        self.children.get(name).copied()
    }

    /// Direct children in creation order
    pub fn children(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.children.values().copied()
    }

    /// Number of postings referring to this account
    pub fn post_count(&self) -> usize {
        self.post_count
    }

    /// Account note, if one was declared
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Set or clear the account note
    pub fn set_note(&mut self, note: Option<String>) {
        self.note = note;
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", self.name)
    }
}

/// Owner of every account reachable from a journal
#[derive(Debug, Clone)]
pub struct AccountTree {
    /// Arena of accounts; removed accounts leave a vacant slot so ids are never reused
    slots: Vec<Option<Account>>,
    /// Number of occupied slots
    live: usize,
}

impl AccountTree {
    const MASTER: AccountId = AccountId(0);

    /// Create a tree holding only the master account
    pub fn new() -> Self {
        let master = Account::new(Self::MASTER, CompactString::new(""), None, 0);
        Self { slots: vec![Some(master)], live: 1 }
    }

    /// The master (root) account
    pub fn master(&self) -> AccountId {
        Self::MASTER
    }

    /// Get an account by id
    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Get an account by id for modification
    pub fn get_mut(&mut self, id: AccountId) -> Option<&mut Account> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Check whether `id` names a live account of this tree
    pub fn contains(&self, id: AccountId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live accounts, master included
    pub fn len(&self) -> usize {
        self.live
    }

    /// A tree always holds its master account
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// All live accounts in arena order
    pub fn iter(&self) -> impl Iterator<Item = &Account> + '_ {
        self.slots.iter().flatten()
    }

    /// Full colon-separated name, e.g. `Assets:Bank:Checking`
    pub fn fullname(&self, id: AccountId) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            segments.push(current.name.as_str());
            current = self.get(parent)?;
        }
        segments.reverse();
        Some(segments.join(":"))
    }

    /// Create (or return the existing) descendant of `parent` named by `path`,
    /// creating intermediate segments as needed
    pub fn add_child(&mut self, parent: AccountId, path: &str) -> Result<AccountId> {
        if !self.contains(parent) {
            return Err(JournalError::AccountNotFound(parent.to_string()));
        }
        let segments = Self::split_path(path)
            .ok_or_else(|| JournalError::InvalidAccountName(path.to_string()))?;
        if segments.is_empty() {
            return Err(JournalError::InvalidAccountName(path.to_string()));
        }
        let mut current = parent;
        for segment in segments {
            current = self.child_or_create(current, segment);
        }
        Ok(current)
    }

    /// Find an account by full path, optionally creating it if it doesn't exist
    pub fn find_account(&mut self, path: &str, auto_create: bool) -> Option<AccountId> {
        if path.is_empty() {
            return Some(Self::MASTER);
        }
        if auto_create {
            return self.add_child(Self::MASTER, path).ok();
        }
        self.lookup(path)
    }

    /// Find an account by full path without creating anything
    pub fn lookup(&self, path: &str) -> Option<AccountId> {
        if path.is_empty() {
            return Some(Self::MASTER);
        }
        let mut current = Self::MASTER;
        for segment in Self::split_path(path)? {
            current = self.get(current)?.child(segment)?;
        }
        Some(current)
    }

    /// First account, in depth-first creation order, whose full name matches `pattern`
    pub fn find_account_re(&self, pattern: &Regex) -> Option<AccountId> {
        self.depth_first().find(|id| {
            self.fullname(*id)
                .map(|name| pattern.is_match(&name))
                .unwrap_or(false)
        })
    }

    /// Remove a leaf account that no posting refers to
    pub fn remove(&mut self, id: AccountId) -> Result<Account> {
        if id == Self::MASTER {
            return Err(JournalError::RemoveMaster);
        }
        let account = self
            .get(id)
            .ok_or_else(|| JournalError::AccountNotFound(id.to_string()))?;
        let name = self.fullname(id).unwrap_or_default();
        if !account.is_leaf() {
            return Err(JournalError::AccountHasChildren { name, children: account.child_count() });
        }
        if account.post_count > 0 {
            return Err(JournalError::AccountInUse { name, postings: account.post_count });
        }

        if let Some(parent) = account.parent {
            let key = account.name.clone();
            if let Some(parent) = self.get_mut(parent) {
                parent.children.shift_remove(&key);
            }
        }
        let removed = self.slots[id.0].take();
        self.live -= 1;
        debug!("removed account {} ({})", name, id);
        removed.ok_or_else(|| JournalError::AccountNotFound(id.to_string()))
    }

    /// Children of `id` as an indexable forward sequence
    pub fn child_accounts(&self, id: AccountId) -> Option<ChildAccounts<'_>> {
        let account = self.get(id)?;
        Some(ChildAccounts { tree: self, account })
    }

    /// Depth-first (pre-order) traversal of every account below the master
    pub fn depth_first(&self) -> DepthFirstIter<'_> {
        let mut stack: Vec<AccountId> = self
            .get(Self::MASTER)
            .map(|master| master.children().collect())
            .unwrap_or_default();
        stack.reverse();
        DepthFirstIter { tree: self, stack }
    }

    /// Structural self-check: parent and child links agree, names key their
    /// entries, depths are consistent and every live account hangs off the master
    pub fn valid(&self) -> bool {
        let master = match self.get(Self::MASTER) {
            Some(master) => master,
            None => {
                debug!("account tree has no master account");
                return false;
            }
        };
        if master.parent.is_some() || !master.name.is_empty() || master.depth != 0 {
            debug!("master account is malformed");
            return false;
        }

        for account in self.iter() {
            if let Some(parent_id) = account.parent {
                let parent = match self.get(parent_id) {
                    Some(parent) => parent,
                    None => {
                        debug!("account {} refers to missing parent {}", account.id, parent_id);
                        return false;
                    }
                };
                if parent.child(&account.name) != Some(account.id)
                    || account.depth != parent.depth + 1
                {
                    debug!("account {} disagrees with its parent {}", account.id, parent_id);
                    return false;
                }
            } else if account.id != Self::MASTER {
                debug!("account {} has no parent", account.id);
                return false;
            }

            for (name, child_id) in &account.children {
                match self.get(*child_id) {
                    Some(child) if child.parent == Some(account.id) && child.name == *name => {}
                    _ => {
                        debug!("account {} has a broken child entry '{}'", account.id, name);
                        return false;
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        let mut stack = vec![Self::MASTER];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                debug!("account {} is reachable twice", id);
                return false;
            }
            if let Some(account) = self.get(id) {
                stack.extend(account.children());
            }
        }
        if seen.len() != self.live {
            debug!("{} of {} accounts are unreachable", self.live - seen.len(), self.live);
            return false;
        }
        true
    }

    pub(crate) fn register_post(&mut self, id: AccountId) {
        if let Some(account) = self.get_mut(id) {
            account.post_count += 1;
        }
    }

    pub(crate) fn release_post(&mut self, id: AccountId) {
        if let Some(account) = self.get_mut(id) {
            account.post_count = account.post_count.saturating_sub(1);
        }
    }

    /// Drop an account slot without any bookkeeping, leaving dangling references behind
    #[cfg(test)]
    pub(crate) fn forget(&mut self, id: AccountId) {
        if self.slots.get_mut(id.0).and_then(Option::take).is_some() {
            self.live -= 1;
        }
    }

    fn split_path(path: &str) -> Option<Vec<&str>> {
        if path.is_empty() {
            return Some(Vec::new());
        }
        let segments: Vec<&str> = path.split(ACCOUNT_SEPARATOR).map(str::trim).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return None;
        }
        Some(segments)
    }

    fn child_or_create(&mut self, parent: AccountId, name: &str) -> AccountId {
        let depth = match self.get(parent) {
            Some(account) => {
                if let Some(existing) = account.child(name) {
                    return existing;
                }
                account.depth + 1
            }
            None => return parent,
        };

        let id = AccountId(self.slots.len());
        let key = CompactString::from(name);
        self.slots.push(Some(Account::new(id, key.clone(), Some(parent), depth)));
        self.live += 1;
        if let Some(parent) = self.get_mut(parent) {
            parent.children.insert(key, id);
        }
        id
    }
}

impl Default for AccountTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first iterator for account traversal
pub struct DepthFirstIter<'t> {
    tree: &'t AccountTree,
    stack: Vec<AccountId>,
}

impl Iterator for DepthFirstIter<'_> {
    type Item = AccountId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if let Some(account) = self.tree.get(id) {
                let mut children: Vec<AccountId> = account.children().collect();
                children.reverse();
                self.stack.extend(children);
                return Some(id);
            }
        }
        None
    }
}

/// The direct children of one account, as a forward-only sequence
#[derive(Debug, Clone, Copy)]
pub struct ChildAccounts<'t> {
    tree: &'t AccountTree,
    account: &'t Account,
}

impl<'t> ChildAccounts<'t> {
    /// The account whose children these are
    pub fn parent(&self) -> &'t Account {
        self.account
    }

    /// Iterate children in creation order
    pub fn iter(&self) -> Children<'t> {
        Children { tree: self.tree, ids: self.account.children.values() }
    }
}

impl<'t> ForwardSequence<'t> for ChildAccounts<'t> {
    type Item = &'t Account;
    type Iter = Children<'t>;

    fn identity(&self) -> usize {
        self.account as *const Account as usize
    }

    fn len(&self) -> usize {
        self.account.child_count()
    }

    fn walk(&self) -> Self::Iter {
        self.iter()
    }
}

/// Iterator over the children of one account
#[derive(Debug, Clone)]
pub struct Children<'t> {
    tree: &'t AccountTree,
    ids: indexmap::map::Values<'t, CompactString, AccountId>,
}

impl<'t> Iterator for Children<'t> {
    type Item = &'t Account;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids.by_ref().find_map(|id| self.tree.get(*id))
    }
}
