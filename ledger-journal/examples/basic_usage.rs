//! Load a small journal and list the postings matching a query

use ledger_journal::parser::read_str;
use ledger_journal::{Journal, Session};

const JOURNAL: &str = "\
2024/01/01 * Opening Balance
    Assets:Checking      $1000
    Equity:Opening

2024/01/03 * Grocery Store
    Expenses:Food        $42.50
    Assets:Checking

2024/01/07 Hardware Shop
    Expenses:Home        $18
    Assets:Checking
";

fn main() -> ledger_journal::Result<()> {
    env_logger::init();

    let mut journal = Journal::new();
    let posts = read_str(&mut journal, JOURNAL)?;
    println!("Loaded {} transaction(s) with {} posting(s)", journal.len(), posts);

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let session = Session::from_env()?;
    let collection = session.collect(&journal, &query)?;

    for post in &collection {
        let account = journal.account_name(post.account()).unwrap_or_default();
        let amount = post.post.amount.as_ref().map(ToString::to_string).unwrap_or_default();
        println!("{} {:<20} {:<20} {:>10}", post.xact.date.format("%Y/%m/%d"), post.xact.payee, account, amount);
    }
    println!("{} posting(s) matched", collection.len());
    Ok(())
}
