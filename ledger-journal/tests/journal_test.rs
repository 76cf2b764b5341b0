//! Integration tests for the journal model and loader

use std::io::Write;

use chrono::NaiveDate;
use ledger_journal::posting::PostingStatus;
use ledger_journal::{Amount, Journal, JournalError, Posting, Transaction};
use rust_decimal::Decimal;

const SAMPLE: &str = "\
; sample journal
account Assets:Checking
    note Main account

2024/03/01 * Salary
    Assets:Checking      $2500
    Income:Salary

2024/03/02 Coffee
    Expenses:Coffee      $3.75
    Assets:Checking

= expenses
    (Budget:Spent)       1

~ monthly
    Expenses:Rent        $900
    Assets:Checking
";

fn write_sample() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();
    file
}

#[test]
fn test_auto_create_path() {
    let mut journal = Journal::new();
    assert_eq!(journal.accounts().len(), 1);

    let leaf = journal.find_account("a:b:c", true).unwrap();
    assert_eq!(journal.accounts().len(), 4);
    assert_eq!(journal.account_name(leaf).as_deref(), Some("a:b:c"));
    assert_eq!(journal.account(leaf).unwrap().depth(), 3);

    assert_eq!(journal.find_account("a:b:c", true), Some(leaf));
    assert_eq!(journal.accounts().len(), 4);
    assert_eq!(journal.find_account("a:b:d", false), None);
    assert_eq!(journal.accounts().len(), 4);
    assert!(journal.valid());
}

#[test]
fn test_read_file() {
    let file = write_sample();
    let mut journal = Journal::new();
    assert!(!journal.was_loaded());

    let posts = journal.read(file.path()).unwrap();
    assert_eq!(posts, 4);
    assert!(journal.was_loaded());
    assert_eq!(journal.len(), 2);
    assert_eq!(journal.auto_xacts().len(), 1);
    assert_eq!(journal.period_xacts().len(), 1);

    let sources = journal.sources();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].filename.as_deref(), Some(file.path()));
    assert_eq!(sources[0].size, SAMPLE.len() as u64);
    assert!(!sources[0].from_stream);

    let checking = journal.accounts().lookup("Assets:Checking").unwrap();
    assert_eq!(journal.account(checking).unwrap().note(), Some("Main account"));
    assert!(journal.valid());
}

#[test]
fn test_read_two_files() {
    let first = write_sample();
    let mut second = tempfile::NamedTempFile::new().unwrap();
    writeln!(second, "2024/03/05 Books\n    Expenses:Books    $20\n    Assets:Checking").unwrap();

    let mut journal = Journal::from_path(first.path()).unwrap();
    journal.read(second.path()).unwrap();
    assert_eq!(journal.sources().len(), 2);
    assert_eq!(journal.len(), 3);
    assert_eq!(journal.xacts()[2].payee, "Books");
    assert!(journal.valid());
}

#[test]
fn test_load_errors() {
    let err = Journal::from_path("/nonexistent/journal.ledger").unwrap_err();
    assert!(matches!(err, JournalError::Load(_)));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "2024/13/45 Bad date\n    Expenses:Food    $1\n    Assets:Cash").unwrap();
    let err = Journal::from_path(file.path()).unwrap_err();
    assert!(err.to_string().contains("line 1"), "unexpected message: {}", err);
}

#[test]
fn test_build_journal_by_hand() {
    let mut journal = Journal::new();
    let food = journal.add_account("Expenses:Food").unwrap();
    let cash = journal.add_account("Assets:Cash").unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();

    let xact = Transaction::new(date, "Market")
        .with_posting(
            Posting::new(food, Some(Amount::with_commodity(Decimal::new(1250, 2), "$")))
                .with_status(PostingStatus::Cleared),
        )
        .with_posting(Posting::new(cash, None));
    let id = journal.add_xact(xact).unwrap();
    assert!(journal.valid());
    assert_eq!(journal.account(food).unwrap().post_count(), 1);

    assert!(matches!(journal.remove_account(cash), Err(JournalError::AccountInUse { .. })));
    journal.remove_xact(id).unwrap();
    assert_eq!(journal.account(food).unwrap().post_count(), 0);
    journal.remove_account(cash).unwrap();
    assert!(journal.accounts().lookup("Assets:Cash").is_none());
    assert!(journal.valid());
}

#[test]
fn test_account_regex_lookup() {
    let file = write_sample();
    let journal = Journal::from_path(file.path()).unwrap();

    let found = journal.find_account_re("coffee").unwrap().unwrap();
    assert_eq!(journal.account_name(found).as_deref(), Some("Expenses:Coffee"));
    assert_eq!(journal.find_account_re("^travel").unwrap(), None);
    assert!(journal.find_account_re("(").is_err());
}
