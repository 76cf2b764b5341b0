//! Report configuration
//!
//! A [`Report`] carries the journal being reported on, the options gathered
//! from arguments and session defaults, and the compiled query. It is also
//! the factory for the handler chain that postings are walked through.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Local, NaiveDate};
use log::debug;

use crate::chain::{FilterPosts, PostChain, PostSink, TruncateXacts};
use crate::filters::{DateFilter, FilterChain, QueryFilter, RealFilter, StatusFilter};
use crate::journal::Journal;
use crate::posting::PostingStatus;
use crate::query::{Predicate, QueryError};
use crate::session::Session;

/// Kind of listing a report produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStyle {
    /// One line per posting
    Register,
    /// Totals per account
    Balance,
    /// Transactions in journal syntax
    Print,
}

impl FromStr for ListingStyle {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "register" | "reg" | "r" => Ok(ListingStyle::Register),
            "balance" | "bal" | "b" => Ok(ListingStyle::Balance),
            "print" | "p" => Ok(ListingStyle::Print),
            other => Err(QueryError::InvalidOptionValue {
                option: "report".to_string(),
                value: other.to_string(),
                reason: "unknown report style".to_string(),
            }),
        }
    }
}

impl fmt::Display for ListingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListingStyle::Register => "register",
            ListingStyle::Balance => "balance",
            ListingStyle::Print => "print",
        };
        f.write_str(name)
    }
}

/// Report display and selection options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// First date included (`--begin`)
    pub begin: Option<NaiveDate>,
    /// First date excluded (`--end`)
    pub end: Option<NaiveDate>,
    /// Only cleared postings (`--cleared`)
    pub cleared: bool,
    /// Only postings that are not cleared (`--uncleared`)
    pub uncleared: bool,
    /// Only pending postings (`--pending`)
    pub pending: bool,
    /// Skip virtual postings (`--real`)
    pub real: bool,
    /// Keep the first N transactions (`--head`)
    pub head: Option<usize>,
    /// Keep the last N transactions (`--tail`)
    pub tail: Option<usize>,
    /// Compare auxiliary dates (`--effective`)
    pub effective: bool,
    /// Set by [`Report::normalize_options`]
    pub listing: Option<ListingStyle>,
}

impl ReportOptions {
    fn statuses(&self) -> Vec<PostingStatus> {
        let mut statuses = Vec::new();
        if self.cleared {
            statuses.push(PostingStatus::Cleared);
        }
        if self.uncleared {
            statuses.extend([PostingStatus::Uncleared, PostingStatus::Pending]);
        }
        if self.pending && !statuses.contains(&PostingStatus::Pending) {
            statuses.push(PostingStatus::Pending);
        }
        statuses
    }
}

/// One report over one journal
#[derive(Debug, Clone)]
pub struct Report<'j> {
    journal: &'j Journal,
    options: ReportOptions,
    query: Option<Predicate>,
}

impl<'j> Report<'j> {
    /// A report with default options
    pub fn new(journal: &'j Journal) -> Self {
        Self { journal, options: ReportOptions::default(), query: None }
    }

    /// A report with the session's default options applied
    pub fn with_session(journal: &'j Journal, session: &Session) -> Result<Self, QueryError> {
        let mut report = Self::new(journal);
        let leftover = process_arguments(session.defaults(), &mut report)
            .map_err(|err| err.context("session defaults"))?;
        if let Some(term) = leftover.into_iter().next() {
            return Err(QueryError::UnexpectedToken(term).context("session defaults"));
        }
        Ok(report)
    }

    /// The journal being reported on
    pub fn journal(&self) -> &'j Journal {
        self.journal
    }

    /// Current options
    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Current options, for modification
    pub fn options_mut(&mut self) -> &mut ReportOptions {
        &mut self.options
    }

    /// The compiled query, if one was given
    pub fn query(&self) -> Option<&Predicate> {
        self.query.as_ref()
    }

    /// Settle option interactions for a listing of the given style
    pub fn normalize_options(&mut self, style: &str) -> Result<(), QueryError> {
        let style = style.parse::<ListingStyle>()?;
        if let (Some(begin), Some(end)) = (self.options.begin, self.options.end) {
            if end < begin {
                return Err(QueryError::InvalidOptionValue {
                    option: "end".to_string(),
                    value: end.to_string(),
                    reason: format!("end date precedes begin date {}", begin),
                });
            }
        }
        self.options.listing = Some(style);
        Ok(())
    }

    /// Compile the query terms left over after option processing
    pub fn parse_query_args<S: AsRef<str>>(&mut self, args: &[S], whence: &str) -> Result<(), QueryError> {
        if args.is_empty() {
            self.query = None;
            return Ok(());
        }
        let predicate = Predicate::parse(args).map_err(|err| err.context(whence))?;
        debug!("{}: query is {}", whence, predicate);
        self.query = Some(predicate);
        Ok(())
    }

    /// Build the handler chain for this report, ending in `sink`
    pub fn chain_post_handlers<S: PostSink<'j>>(&self, sink: S) -> PostChain<'j, S> {
        let mut filters = FilterChain::new();
        if let Some(query) = &self.query {
            filters.push(Box::new(QueryFilter::new(query.clone())));
        }
        let statuses = self.options.statuses();
        if !statuses.is_empty() {
            filters.push(Box::new(StatusFilter::new(statuses)));
        }
        if self.options.real {
            filters.push(Box::new(RealFilter));
        }
        if self.options.begin.is_some() || self.options.end.is_some() {
            filters.push(Box::new(
                DateFilter::new(self.options.begin, self.options.end).effective(self.options.effective),
            ));
        }

        let mut chain = PostChain::new(sink);
        if !filters.is_empty() {
            chain.push_stage(Box::new(FilterPosts::new(self.journal, filters)));
        }
        if self.options.head.is_some() || self.options.tail.is_some() {
            chain.push_stage(Box::new(TruncateXacts::new(self.options.head, self.options.tail)));
        }
        debug!("built handler chain: {:?}", chain.descriptions());
        chain
    }
}

/// Long and short names understood by [`process_arguments`]
const REPORT_OPTIONS: &[&str] = &[
    "begin", "b", "end", "e", "head", "first", "tail", "last", "cleared", "C", "uncleared", "U",
    "pending", "real", "R", "effective", "aux-date",
];

/// Whether `name` (without dashes) is a report option
pub fn is_report_option(name: &str) -> bool {
    REPORT_OPTIONS.contains(&name)
}

/// Consume the options in `args`, returning the arguments that are not options
///
/// Accepts `--name value`, `--name=value` and `-x value`; `--` ends option processing.
pub fn process_arguments<S: AsRef<str>>(args: &[S], report: &mut Report<'_>) -> Result<Vec<String>, QueryError> {
    let mut remaining = Vec::new();
    let mut iter = args.iter().map(AsRef::as_ref);

    while let Some(arg) = iter.next() {
        if arg == "--" {
            remaining.extend(iter.by_ref().map(str::to_string));
            break;
        }

        let (name, inline) = if let Some(long) = arg.strip_prefix("--") {
            match long.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (long, None),
            }
        } else if arg.len() == 2 && arg.starts_with('-') && arg[1..].chars().all(char::is_alphabetic) {
            (&arg[1..], None)
        } else {
            remaining.push(arg.to_string());
            continue;
        };

        let options = &mut report.options;
        match name {
            "begin" | "b" => options.begin = Some(parse_date(arg, option_value(arg, inline, &mut iter)?)?),
            "end" | "e" => options.end = Some(parse_date(arg, option_value(arg, inline, &mut iter)?)?),
            "head" | "first" => options.head = Some(parse_count(arg, option_value(arg, inline, &mut iter)?)?),
            "tail" | "last" => options.tail = Some(parse_count(arg, option_value(arg, inline, &mut iter)?)?),
            "cleared" | "C" => options.cleared = flag(arg, inline)?,
            "uncleared" | "U" => options.uncleared = flag(arg, inline)?,
            "pending" => options.pending = flag(arg, inline)?,
            "real" | "R" => options.real = flag(arg, inline)?,
            "effective" | "aux-date" => options.effective = flag(arg, inline)?,
            _ => return Err(QueryError::UnknownOption(arg.to_string())),
        }
    }
    Ok(remaining)
}

fn option_value<'a>(
    option: &str,
    inline: Option<&'a str>,
    rest: &mut impl Iterator<Item = &'a str>,
) -> Result<&'a str, QueryError> {
    inline.or_else(|| rest.next()).ok_or_else(|| QueryError::MissingOptionValue(option.to_string()))
}

fn flag(option: &str, inline: Option<&str>) -> Result<bool, QueryError> {
    match inline {
        None | Some("true") | Some("yes") => Ok(true),
        Some("false") | Some("no") => Ok(false),
        Some(value) => Err(QueryError::InvalidOptionValue {
            option: option.to_string(),
            value: value.to_string(),
            reason: "expected no value or a boolean".to_string(),
        }),
    }
}

fn parse_count(option: &str, value: &str) -> Result<usize, QueryError> {
    value.parse::<usize>().map_err(|err| QueryError::InvalidOptionValue {
        option: option.to_string(),
        value: value.to_string(),
        reason: err.to_string(),
    })
}

/// Parse a date argument: full dates, `YYYY-MM` / `YYYY/MM`, `YYYY`, or today/yesterday/tomorrow
fn parse_date(option: &str, value: &str) -> Result<NaiveDate, QueryError> {
    let invalid = |reason: &str| QueryError::InvalidOptionValue {
        option: option.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Ok(date);
        }
    }

    let parts: Vec<&str> = value.split(['-', '/', '.']).collect();
    let numeric = parts.iter().all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if numeric && (1..=2).contains(&parts.len()) && parts[0].len() == 4 {
        let year: i32 = parts[0].parse().map_err(|_| invalid("invalid year"))?;
        let month: u32 = match parts.get(1) {
            Some(month) => month.parse().map_err(|_| invalid("invalid month"))?,
            None => 1,
        };
        return NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| invalid("no such date"));
    }

    let today = Local::now().date_naive();
    match value.to_lowercase().as_str() {
        "today" => Ok(today),
        "yesterday" => Ok(today - Duration::days(1)),
        "tomorrow" => Ok(today + Duration::days(1)),
        _ => Err(invalid("unrecognized date")),
    }
}
