//! Journal file loading using nom combinators
//!
//! Entries are grouped line by line: an unindented line starts a transaction,
//! an automated (`=`) or periodic (`~`) transaction, or a directive, and the
//! indented lines that follow belong to it. Headers and postings are parsed
//! with nom.
//!
//! ```text
//! 2024/01/15=2024/01/16 * (1042) Grocery Store  ; weekly shopping
//!     Expenses:Food          $45.50
//!     ; :groceries:
//!     Assets:Checking
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, info, warn};
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_till},
    character::complete::{char, digit1, one_of, space0},
    combinator::{map, map_res, opt, rest, value},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use crate::account::AccountId;
use crate::amount::Amount;
use crate::journal::{FileInfo, Journal};
use crate::posting::{Posting, PostingFlags, PostingStatus};
use crate::transaction::{AutoTransaction, PeriodTransaction, Position, Transaction, TransactionStatus};

type ParseResult<'a, T> = IResult<&'a str, T>;

const UNSPECIFIED_PAYEE: &str = "<Unspecified payee>";

/// Errors raised while loading a journal source
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The source could not be read
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The source text is malformed
    #[error("Parse error in {filename} at line {line}: {message}")]
    Parse {
        /// Source name, `<stream>` for streamed text
        filename: String,
        /// Line the error was found on
        line: usize,
        /// What went wrong
        message: String,
    },
}

/// Load a journal file, returning the number of postings added to the journal
pub fn read(journal: &mut Journal, path: &Path) -> Result<usize, LoadError> {
    let text = fs::read_to_string(path)
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    let file_info = FileInfo::from_path(path)
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    info!("reading journal file {}", path.display());
    journal.add_source(file_info);

    let posts = Loader::new(journal, Some(path.to_path_buf())).load(&text)?;
    info!("loaded {} posting(s) from {}", posts, path.display());
    Ok(posts)
}

/// Load journal text that did not come from a named file
pub fn read_str(journal: &mut Journal, text: &str) -> Result<usize, LoadError> {
    journal.add_source(FileInfo::from_stream(text.len() as u64));
    Loader::new(journal, None).load(text)
}

enum Entry {
    Xact(Transaction),
    Auto(AutoTransaction),
    Period(PeriodTransaction),
    Account(AccountId),
}

struct Pending {
    entry: Entry,
    beg_line: usize,
    end_line: usize,
}

struct Loader<'j> {
    journal: &'j mut Journal,
    filename: Option<PathBuf>,
    pending: Option<Pending>,
    posts: usize,
}

impl<'j> Loader<'j> {
    fn new(journal: &'j mut Journal, filename: Option<PathBuf>) -> Self {
        Self { journal, filename, pending: None, posts: 0 }
    }

    fn load(mut self, text: &str) -> Result<usize, LoadError> {
        for (index, raw) in text.lines().enumerate() {
            self.line(index + 1, raw.trim_end())?;
        }
        self.finish()?;
        Ok(self.posts)
    }

    fn line(&mut self, line_no: usize, line: &str) -> Result<(), LoadError> {
        if line.trim().is_empty() {
            return self.finish();
        }
        if line.starts_with([' ', '\t']) {
            return self.indented(line_no, line.trim_start());
        }

        self.finish()?;
        let Some(first) = line.chars().next() else {
            return Ok(());
        };
        match first {
            c if c.is_ascii_digit() => {
                let (_, xact) = xact_header(line).map_err(|_| {
                    self.error(line_no, format!("invalid transaction header '{}'", line))
                })?;
                self.start(line_no, Entry::Xact(xact));
            }
            '=' => {
                let auto = AutoTransaction::new(line[1..].trim())
                    .map_err(|err| self.error(line_no, err.to_string()))?;
                self.start(line_no, Entry::Auto(auto));
            }
            '~' => self.start(line_no, Entry::Period(PeriodTransaction::new(line[1..].trim()))),
            ';' | '#' | '*' | '%' | '|' => {}
            _ => self.directive(line_no, line)?,
        }
        Ok(())
    }

    fn start(&mut self, line_no: usize, entry: Entry) {
        self.pending = Some(Pending { entry, beg_line: line_no, end_line: line_no });
    }

    fn indented(&mut self, line_no: usize, text: &str) -> Result<(), LoadError> {
        if self.pending.is_none() {
            if text.starts_with(';') {
                return Ok(());
            }
            return Err(self.error(line_no, "posting outside of a transaction"));
        }

        if let Some(comment) = text.strip_prefix(';') {
            if let Some(pending) = self.pending.as_mut() {
                pending.end_line = line_no;
                pending.entry.add_comment(comment.trim());
            }
            return Ok(());
        }

        if let Some(Pending { entry: Entry::Account(id), .. }) = self.pending {
            if let Some(note) = text.strip_prefix("note") {
                if let Some(account) = self.journal.accounts_mut().get_mut(id) {
                    account.set_note(Some(note.trim().to_string()));
                }
            } else {
                debug!("line {}: ignoring account sub-directive '{}'", line_no, text);
            }
            return Ok(());
        }

        let post = self.posting(line_no, text)?;
        if let Some(pending) = self.pending.as_mut() {
            pending.end_line = line_no;
            pending.entry.push_posting(post);
        }
        Ok(())
    }

    fn posting(&mut self, line_no: usize, text: &str) -> Result<Posting, LoadError> {
        let (_, parsed) = posting_line(text)
            .map_err(|_| self.error(line_no, format!("invalid posting '{}'", text)))?;

        let account = self
            .journal
            .find_account(parsed.account, true)
            .ok_or_else(|| self.error(line_no, format!("invalid account name '{}'", parsed.account)))?;

        let amount = match parsed.amount.trim() {
            "" => None,
            amount => Some(
                amount
                    .parse::<Amount>()
                    .map_err(|err| self.error(line_no, err.to_string()))?,
            ),
        };

        let mut post = Posting::new(account, amount).with_status(parsed.status).with_flags(parsed.flags);
        if let Some((total, cost)) = parsed.cost {
            let cost = cost
                .trim()
                .parse::<Amount>()
                .map_err(|err| self.error(line_no, err.to_string()))?;
            let cost = match (&post.amount, total) {
                (Some(amount), false) => cost.scaled(amount.value()).ok_or_else(|| {
                    self.error(line_no, format!("cost of {} at {} overflows", amount, cost))
                })?,
                _ => cost,
            };
            post.cost = Some(cost);
        }
        if let Some(note) = parsed.note {
            let note = note.trim();
            apply_metadata(note, &mut post.metadata);
            post.note = Some(note.to_string());
        }
        Ok(post)
    }

    fn directive(&mut self, line_no: usize, line: &str) -> Result<(), LoadError> {
        let line = line.split(';').next().unwrap_or_default().trim_end();
        let (word, arg) = match line.split_once(char::is_whitespace) {
            Some((word, arg)) => (word, arg.trim()),
            None => (line, ""),
        };

        match word {
            "account" => {
                let id = self
                    .journal
                    .add_account(arg)
                    .map_err(|err| self.error(line_no, err.to_string()))?;
                self.start(line_no, Entry::Account(id));
            }
            "bucket" | "A" => {
                let id = self
                    .journal
                    .add_account(arg)
                    .map_err(|err| self.error(line_no, err.to_string()))?;
                self.journal
                    .set_bucket(Some(id))
                    .map_err(|err| self.error(line_no, err.to_string()))?;
                debug!("bucket account set to {}", arg);
            }
            _ => warn!("{}:{}: skipping unsupported directive '{}'", self.source_name(), line_no, word),
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), LoadError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let beg_line = pending.beg_line;
        let pos = Position {
            pathname: self.filename.clone(),
            beg_line,
            end_line: pending.end_line,
        };

        let result = match pending.entry {
            Entry::Xact(mut xact) => {
                self.balance_to_bucket(&mut xact);
                xact.pos = Some(pos);
                let count = xact.postings.len();
                let added = self.journal.add_xact(xact);
                if added.is_ok() {
                    self.posts += count;
                }
                added.map(|_| ())
            }
            Entry::Auto(mut auto) => {
                auto.pos = Some(pos);
                self.journal.add_auto_xact(auto)
            }
            Entry::Period(mut period) => {
                period.pos = Some(pos);
                self.journal.add_period_xact(period)
            }
            Entry::Account(_) => Ok(()),
        };
        result.map_err(|err| self.error(beg_line, err.to_string()))
    }

    /// A lone posting is balanced against the bucket account, when one is set
    fn balance_to_bucket(&self, xact: &mut Transaction) {
        let Some(bucket) = self.journal.bucket() else {
            return;
        };
        if let [only] = xact.postings.as_slice() {
            if let Some(amount) = only.amount.clone() {
                let post = Posting::new(bucket, Some(-amount)).with_flags(PostingFlags::CALCULATED);
                xact.add_posting(post);
            }
        }
    }

    fn source_name(&self) -> String {
        match &self.filename {
            Some(path) => path.display().to_string(),
            None => "<stream>".to_string(),
        }
    }

    fn error(&self, line: usize, message: impl Into<String>) -> LoadError {
        LoadError::Parse { filename: self.source_name(), line, message: message.into() }
    }
}

impl Entry {
    fn push_posting(&mut self, post: Posting) {
        match self {
            Entry::Xact(xact) => xact.add_posting(post),
            Entry::Auto(auto) => auto.postings.push(post),
            Entry::Period(period) => period.postings.push(post),
            Entry::Account(_) => {}
        }
    }

    fn add_comment(&mut self, comment: &str) {
        let (note, metadata) = match self {
            Entry::Xact(xact) => match xact.postings.last_mut() {
                Some(post) => (&mut post.note, &mut post.metadata),
                None => (&mut xact.note, &mut xact.metadata),
            },
            Entry::Auto(AutoTransaction { postings, .. })
            | Entry::Period(PeriodTransaction { postings, .. }) => match postings.last_mut() {
                Some(post) => (&mut post.note, &mut post.metadata),
                None => return,
            },
            Entry::Account(_) => return,
        };
        apply_metadata(comment, metadata);
        if let Some(existing) = note.as_mut() {
            existing.push('\n');
            existing.push_str(comment);
        } else {
            *note = Some(comment.to_string());
        }
    }
}

/// Extract `:tag1:tag2:` tags and a leading `key: value` pair from comment text
fn apply_metadata(comment: &str, metadata: &mut HashMap<String, Option<String>>) {
    let mut tagged = false;
    for word in comment.split_whitespace() {
        if word.len() > 2 && word.starts_with(':') && word.ends_with(':') {
            tagged = true;
            for name in word.split(':').filter(|name| !name.is_empty()) {
                metadata.insert(name.to_string(), None);
            }
        }
    }
    if tagged {
        return;
    }

    if let Some((key, val)) = comment.split_once(':') {
        let key = key.trim();
        if !key.is_empty() && !key.contains(char::is_whitespace) {
            let val = val.trim();
            let val = if val.is_empty() { None } else { Some(val.to_string()) };
            metadata.insert(key.to_string(), val);
        }
    }
}

/// Parse a date in `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYY.MM.DD` form
fn date_field(input: &str) -> ParseResult<NaiveDate> {
    map_res(
        tuple((digit1, one_of("-/."), digit1, one_of("-/."), digit1)),
        |(year, _, month, _, day): (&str, char, &str, char, &str)| -> Result<NaiveDate, &'static str> {
            let year = year.parse::<i32>().map_err(|_| "year out of range")?;
            let month = month.parse::<u32>().map_err(|_| "month out of range")?;
            let day = day.parse::<u32>().map_err(|_| "day out of range")?;
            NaiveDate::from_ymd_opt(year, month, day).ok_or("no such date")
        },
    )(input)
}

fn xact_status(input: &str) -> ParseResult<TransactionStatus> {
    alt((
        value(TransactionStatus::Cleared, char('*')),
        value(TransactionStatus::Pending, char('!')),
    ))(input)
}

fn posting_status(input: &str) -> ParseResult<PostingStatus> {
    alt((value(PostingStatus::Cleared, char('*')), value(PostingStatus::Pending, char('!'))))(input)
}

fn code(input: &str) -> ParseResult<&str> {
    delimited(char('('), is_not(")"), char(')'))(input)
}

fn note(input: &str) -> ParseResult<&str> {
    preceded(char(';'), rest)(input)
}

/// Parse a transaction header line
fn xact_header(input: &str) -> ParseResult<Transaction> {
    map(
        tuple((
            date_field,
            opt(preceded(tag("="), date_field)),
            space0,
            opt(terminated(xact_status, space0)),
            opt(terminated(code, space0)),
            take_till(|c| c == ';'),
            opt(note),
        )),
        |(date, aux_date, _, status, code, payee, note)| {
            let payee = payee.trim();
            let mut xact = Transaction::new(date, if payee.is_empty() { UNSPECIFIED_PAYEE } else { payee });
            xact.aux_date = aux_date;
            xact.status = status.unwrap_or_default();
            xact.code = code.map(|code| code.trim().to_string());
            if let Some(note) = note {
                let note = note.trim();
                apply_metadata(note, &mut xact.metadata);
                xact.note = Some(note.to_string());
            }
            xact
        },
    )(input)
}

struct ParsedPosting<'a> {
    status: PostingStatus,
    account: &'a str,
    flags: PostingFlags,
    amount: &'a str,
    cost: Option<(bool, &'a str)>,
    note: Option<&'a str>,
}

/// Account names end at two spaces, a tab, a comment or the end of the line
fn plain_account(input: &str) -> ParseResult<&str> {
    let end = [input.find("  "), input.find('\t'), input.find(';')]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(input.len());
    let name = input[..end].trim_end();
    if name.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::TakeWhile1)));
    }
    Ok((&input[end..], name))
}

fn posting_account(input: &str) -> ParseResult<(&str, PostingFlags)> {
    alt((
        map(delimited(char('('), is_not(")"), char(')')), |name| (name, PostingFlags::VIRTUAL)),
        map(delimited(char('['), is_not("]"), char(']')), |name| {
            (name, PostingFlags::VIRTUAL | PostingFlags::MUST_BALANCE)
        }),
        map(plain_account, |name| (name, PostingFlags::empty())),
    ))(input)
}

fn cost(input: &str) -> ParseResult<(bool, &str)> {
    tuple((alt((value(true, tag("@@")), value(false, tag("@")))), take_till(|c| c == ';')))(input)
}

/// Parse the body of an indented posting line
fn posting_line(input: &str) -> ParseResult<ParsedPosting<'_>> {
    map(
        tuple((
            opt(terminated(posting_status, space0)),
            posting_account,
            take_till(|c| c == '@' || c == ';'),
            opt(cost),
            opt(note),
        )),
        |(status, (account, flags), amount, cost, note)| ParsedPosting {
            status: status.unwrap_or_default(),
            account: account.trim(),
            flags,
            amount,
            cost,
            note,
        },
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn load(text: &str) -> (Journal, Result<usize, LoadError>) {
        let mut journal = Journal::new();
        let result = read_str(&mut journal, text);
        (journal, result)
    }

    fn name(journal: &Journal, id: AccountId) -> String {
        journal.account_name(id).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        for text in ["2024-03-05", "2024/03/05", "2024.3.5"] {
            assert_eq!(date_field(text).unwrap().1, expected);
        }
        assert!(date_field("2024/02/30").is_err());
        assert!(date_field("March 5").is_err());
    }

    #[test]
    fn test_parse_transaction_header() {
        let (rest, xact) = xact_header("2024/01/15=2024/01/20 * (1042) Grocery Store ; weekly").unwrap();
        assert!(rest.is_empty());
        assert_eq!(xact.payee, "Grocery Store");
        assert_eq!(xact.aux_date, NaiveDate::from_ymd_opt(2024, 1, 20));
        assert_eq!(xact.status, TransactionStatus::Cleared);
        assert_eq!(xact.code.as_deref(), Some("1042"));
        assert_eq!(xact.note.as_deref(), Some("weekly"));

        let (_, bare) = xact_header("2024-01-15").unwrap();
        assert_eq!(bare.payee, UNSPECIFIED_PAYEE);
        assert_eq!(bare.status, TransactionStatus::Uncleared);
    }

    #[test]
    fn test_parse_posting_line() {
        let (_, post) = posting_line("! Expenses:Food and Drink  $45.50 ; lunch").unwrap();
        assert_eq!(post.status, PostingStatus::Pending);
        assert_eq!(post.account, "Expenses:Food and Drink");
        assert_eq!(post.amount.trim(), "$45.50");
        assert_eq!(post.note, Some(" lunch"));

        let (_, virt) = posting_line("(Budget:Food)  -10").unwrap();
        assert_eq!(virt.account, "Budget:Food");
        assert_eq!(virt.flags, PostingFlags::VIRTUAL);

        let (_, balanced) = posting_line("[Savings]\t$5").unwrap();
        assert!(balanced.flags.contains(PostingFlags::MUST_BALANCE));

        let (_, priced) = posting_line("Assets:Broker  10 AAPL @@ $1500").unwrap();
        assert_eq!(priced.cost, Some((true, " $1500")));

        let (_, elided) = posting_line("Assets:Checking").unwrap();
        assert_eq!(elided.account, "Assets:Checking");
        assert!(elided.amount.is_empty());
    }

    #[test]
    fn test_load_transactions() {
        let text = "\
; opening comment
2024/01/15 * Grocery Store
    Expenses:Food          $45.50
    Assets:Checking

2024/01/16 Gas Station
    Expenses:Auto:Fuel     $30.00  ; :fuel:
    Assets:Checking       $-30.00
";
        let (journal, result) = load(text);
        assert_eq!(result.unwrap(), 4);
        assert_eq!(journal.len(), 2);
        assert!(journal.was_loaded());
        assert!(journal.sources()[0].from_stream);

        let first = &journal.xacts()[0];
        assert_eq!(first.status, TransactionStatus::Cleared);
        assert_eq!(name(&journal, first.postings[0].account), "Expenses:Food");
        assert!(first.postings[1].flags.contains(PostingFlags::CALCULATED));
        assert_eq!(first.pos.as_ref().map(|pos| (pos.beg_line, pos.end_line)), Some((2, 4)));

        let second = &journal.xacts()[1];
        assert!(second.postings[0].has_tag("fuel"));
        assert!(journal.valid());
    }

    #[test]
    fn test_load_metadata_lines() {
        let text = "\
2024/02/01 Hardware Store
    ; Project: kitchen
    Expenses:Home    $120.00
    ; Receipt: 8812
    ; :reviewed:
    Assets:Checking
";
        let (journal, result) = load(text);
        result.unwrap();
        let xact = &journal.xacts()[0];
        assert_eq!(xact.metadata.get("Project"), Some(&Some("kitchen".to_string())));
        assert_eq!(xact.postings[0].tag_value("Receipt"), Some("8812"));
        assert!(xact.postings[0].has_tag("reviewed"));
        assert_eq!(xact.postings[0].note.as_deref(), Some("Receipt: 8812\n:reviewed:"));
    }

    #[test]
    fn test_load_cost() {
        let text = "\
2024/03/01 Broker
    Assets:Broker     10 AAPL @ $150
    Assets:Checking
";
        let (journal, result) = load(text);
        result.unwrap();
        let cost = journal.xacts()[0].postings[0].cost.clone().unwrap();
        assert_eq!(cost, Amount::with_commodity(Decimal::from(1500), "$"));
    }

    #[test]
    fn test_load_cost_overflow() {
        let text = "\
2024/01/01 Shop
    Assets:Stock     79228162514264337593543950335 ABC @ $2
    Assets:Cash
";
        let (journal, result) = load(text);
        match result {
            Err(LoadError::Parse { line, message, .. }) => {
                assert_eq!(line, 2);
                assert!(message.contains("overflows"), "unexpected message: {}", message);
            }
            other => panic!("expected a parse error, got {:?}", other),
        }
        assert!(journal.is_empty());
    }

    #[test]
    fn test_load_auto_and_periodic() {
        let text = "\
= expenses:food
    (Budget:Food)     -1

~ Monthly
    Expenses:Rent     $1000
    Assets:Checking

2024/01/01 Rent
    Expenses:Rent     $1000
    Assets:Checking
";
        let (journal, result) = load(text);
        assert_eq!(result.unwrap(), 2);
        assert_eq!(journal.auto_xacts().len(), 1);
        assert_eq!(journal.auto_xacts()[0].query, "expenses:food");
        assert_eq!(journal.period_xacts()[0].period, "Monthly");
        assert_eq!(journal.period_xacts()[0].postings.len(), 2);
        assert_eq!(journal.len(), 1);
        assert!(journal.valid());
    }

    #[test]
    fn test_load_directives() {
        let text = "\
account Assets:Checking
    note Main bank account
commodity $
bucket Assets:Checking

2024/01/05 Coffee
    Expenses:Coffee    $3.50
";
        let (journal, result) = load(text);
        assert_eq!(result.unwrap(), 2);
        let checking = journal.accounts().lookup("Assets:Checking").unwrap();
        assert_eq!(journal.account(checking).unwrap().note(), Some("Main bank account"));
        assert_eq!(journal.bucket(), Some(checking));

        let balancing = &journal.xacts()[0].postings[1];
        assert_eq!(balancing.account, checking);
        assert_eq!(balancing.amount, Some(Amount::with_commodity(Decimal::new(-350, 2), "$")));
    }

    #[test]
    fn test_parse_errors_report_lines() {
        let (_, result) = load("2024/01/01 Shop\n    Expenses:Food  $abc\n");
        match result {
            Err(LoadError::Parse { filename, line, .. }) => {
                assert_eq!(filename, "<stream>");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let (_, result) = load("    Expenses:Food  $1\n");
        assert!(matches!(result, Err(LoadError::Parse { line: 1, .. })));

        let (_, result) = load("2024/13/01 Bad date\n    Expenses:Food  $1\n");
        assert!(matches!(result, Err(LoadError::Parse { line: 1, .. })));

        let (_, result) = load("2024/01/01 Empty\n\n");
        assert!(matches!(result, Err(LoadError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_partial_load_keeps_earlier_entries() {
        let text = "\
2024/01/01 Good
    Expenses:Food    $1
    Assets:Cash

2024/01/02 Bad
    Expenses:Food    1.2.3
";
        let (journal, result) = load(text);
        assert!(result.is_err());
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_read_missing_file() {
        let mut journal = Journal::new();
        let result = read(&mut journal, Path::new("/nonexistent/ledger.dat"));
        assert!(matches!(result, Err(LoadError::Io { .. })));
        assert!(journal.sources().is_empty());
    }
}
