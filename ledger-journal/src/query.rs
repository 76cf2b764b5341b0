//! Query language for selecting postings
//!
//! A query is a list of terms. Bare terms are regular expressions matched
//! against the account's full name; a prefix or keyword switches the field:
//!
//! | prefix | keyword | matches |
//! |---|---|---|
//! | `@` | `payee`, `desc` | transaction payee |
//! | `#` | `code` | transaction code |
//! | `=` | `note` | posting or transaction note |
//! | `%` | `tag`, `meta` | tag name, or `name=value` |
//! | | `account` | account full name |
//!
//! Terms combine with `not`/`!`, `and`/`&`, `or`/`|` and parentheses.
//! Juxtaposed terms are alternatives: `food dining` matches either.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::account::AccountTree;
use crate::posting::PostingRef;

/// Errors in query text or report arguments
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Option name not recognised
    #[error("Unknown option '{0}'")]
    UnknownOption(String),

    /// Option given without its value
    #[error("Option '{0}' requires a value")]
    MissingOptionValue(String),

    /// Option value could not be interpreted
    #[error("Invalid value '{value}' for option '{option}': {reason}")]
    InvalidOptionValue {
        /// Option as written
        option: String,
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Token out of place in the query
    #[error("Unexpected token '{0}' in query")]
    UnexpectedToken(String),

    /// Query ended while an operand was expected
    #[error("Unexpected end of query")]
    UnexpectedEnd,

    /// Parentheses do not pair up
    #[error("Unbalanced parenthesis in query")]
    UnbalancedParenthesis,

    /// Term is not a valid regular expression
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern text
        pattern: String,
        /// Regex compilation error
        #[source]
        source: regex::Error,
    },

    /// Keyword recognised but not supported
    #[error("Query keyword '{0}' is not supported")]
    Unsupported(String),

    /// An error annotated with where it was raised
    #[error("{whence}: {cause}")]
    Context {
        /// Operation that raised the error
        whence: String,
        /// The annotated error
        #[source]
        cause: Box<QueryError>,
    },
}

impl QueryError {
    /// Annotate this error with the operation that raised it
    pub fn context(self, whence: impl Into<String>) -> Self {
        QueryError::Context { whence: whence.into(), cause: Box::new(self) }
    }

    /// The innermost error, with every context layer removed
    pub fn root_cause(&self) -> &QueryError {
        match self {
            QueryError::Context { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// Split a command line into arguments, honouring quotes and backslash escapes
///
/// ```
/// use ledger_journal::query::split_arguments;
///
/// assert_eq!(split_arguments(r#"--begin 2024 "Expenses:Food and Drink""#),
///            vec!["--begin", "2024", "Expenses:Food and Drink"]);
/// ```
pub fn split_arguments(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_arg = true;
            }
            '\'' | '"' if quote.is_none() => {
                quote = Some(c);
                in_arg = true;
            }
            c if Some(c) == quote => quote = None,
            c if c.is_whitespace() && quote.is_none() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}

/// A compiled query
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Account full name
    Account(Regex),
    /// Transaction payee
    Payee(Regex),
    /// Transaction code
    Code(Regex),
    /// Posting or transaction note
    Note(Regex),
    /// Tag on the posting or its transaction, optionally with a matching value
    Tag {
        /// Tag name pattern
        name: Regex,
        /// Tag value pattern, if one was given
        value: Option<Regex>,
    },
    /// Negation
    Not(Box<Predicate>),
    /// Both operands
    And(Box<Predicate>, Box<Predicate>),
    /// Either operand
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Compile already split query arguments
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, QueryError> {
        let tokens = lex(args)?;
        let mut parser = QueryParser { tokens, pos: 0 };
        let predicate = parser.query()?;
        match parser.peek() {
            None => Ok(predicate),
            Some(Token::RParen) => Err(QueryError::UnbalancedParenthesis),
            Some(token) => Err(QueryError::UnexpectedToken(token.to_string())),
        }
    }

    /// Compile query text, splitting it into arguments first
    pub fn parse_str(text: &str) -> Result<Self, QueryError> {
        Self::parse(&split_arguments(text))
    }

    /// Whether a posting satisfies this predicate
    pub fn matches(&self, accounts: &AccountTree, post: PostingRef<'_>) -> bool {
        match self {
            Predicate::Account(re) => accounts
                .fullname(post.account())
                .map(|name| re.is_match(&name))
                .unwrap_or(false),
            Predicate::Payee(re) => re.is_match(&post.xact.payee),
            Predicate::Code(re) => post.xact.code.as_deref().map(|code| re.is_match(code)).unwrap_or(false),
            Predicate::Note(re) => [post.post.note.as_deref(), post.xact.note.as_deref()]
                .into_iter()
                .flatten()
                .any(|note| re.is_match(note)),
            Predicate::Tag { name, value } => post
                .post
                .metadata
                .iter()
                .chain(post.xact.metadata.iter())
                .any(|(key, val)| {
                    name.is_match(key)
                        && match value {
                            None => true,
                            Some(value) => val.as_deref().map(|val| value.is_match(val)).unwrap_or(false),
                        }
                }),
            Predicate::Not(inner) => !inner.matches(accounts, post),
            Predicate::And(lhs, rhs) => lhs.matches(accounts, post) && rhs.matches(accounts, post),
            Predicate::Or(lhs, rhs) => lhs.matches(accounts, post) || rhs.matches(accounts, post),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Account(re) => write!(f, "account =~ /{}/", re.as_str()),
            Predicate::Payee(re) => write!(f, "payee =~ /{}/", re.as_str()),
            Predicate::Code(re) => write!(f, "code =~ /{}/", re.as_str()),
            Predicate::Note(re) => write!(f, "note =~ /{}/", re.as_str()),
            Predicate::Tag { name, value: None } => write!(f, "tag(/{}/)", name.as_str()),
            Predicate::Tag { name, value: Some(value) } => {
                write!(f, "tag(/{}/) =~ /{}/", name.as_str(), value.as_str())
            }
            Predicate::Not(inner) => write!(f, "not {}", inner),
            Predicate::And(lhs, rhs) => write!(f, "({} and {})", lhs, rhs),
            Predicate::Or(lhs, rhs) => write!(f, "({} or {})", lhs, rhs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Account,
    Payee,
    Code,
    Note,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Field(Field),
    Term(String),
    Unsupported(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Not => f.write_str("not"),
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Field(field) => write!(f, "{:?}", field),
            Token::Term(term) => f.write_str(term),
            Token::Unsupported(word) => f.write_str(word),
        }
    }
}

fn lex<S: AsRef<str>>(args: &[S]) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    for arg in args {
        let arg = arg.as_ref();
        let keyword = match arg {
            "and" => Some(Token::And),
            "or" => Some(Token::Or),
            "not" => Some(Token::Not),
            "account" => Some(Token::Field(Field::Account)),
            "payee" | "desc" => Some(Token::Field(Field::Payee)),
            "code" => Some(Token::Field(Field::Code)),
            "note" => Some(Token::Field(Field::Note)),
            "tag" | "meta" => Some(Token::Field(Field::Tag)),
            "expr" | "show" | "only" | "bold" | "for" | "since" | "until" => {
                Some(Token::Unsupported(arg.to_string()))
            }
            _ => None,
        };
        // the argument after a field keyword is always a pattern
        let after_field = matches!(tokens.last(), Some(Token::Field(_)));
        match keyword {
            Some(token) if !after_field => tokens.push(token),
            _ => lex_arg(arg, &mut tokens)?,
        }
    }
    Ok(tokens)
}

fn lex_arg(arg: &str, tokens: &mut Vec<Token>) -> Result<(), QueryError> {
    let mut chars = arg.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '!' => tokens.push(Token::Not),
            '&' => tokens.push(Token::And),
            '|' => tokens.push(Token::Or),
            '@' => tokens.push(Token::Field(Field::Payee)),
            '#' => tokens.push(Token::Field(Field::Code)),
            '=' => tokens.push(Token::Field(Field::Note)),
            '%' => tokens.push(Token::Field(Field::Tag)),
            '/' => {
                let mut pattern = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '/' {
                        closed = true;
                        break;
                    }
                    pattern.push(c);
                }
                if !closed {
                    return Err(QueryError::UnexpectedEnd);
                }
                tokens.push(Token::Term(pattern));
            }
            c => {
                let mut term = String::from(c);
                while let Some(&next) = chars.peek() {
                    if matches!(next, '(' | ')' | '&' | '|' | '!') {
                        break;
                    }
                    term.push(next);
                    chars.next();
                }
                tokens.push(Token::Term(term));
            }
        }
    }
    Ok(())
}

struct QueryParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl QueryParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// query := or_expr+
    fn query(&mut self) -> Result<Predicate, QueryError> {
        let mut lhs = self.or_expr()?;
        while !matches!(self.peek(), None | Some(Token::RParen)) {
            let rhs = self.or_expr()?;
            lhs = Predicate::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn or_expr(&mut self) -> Result<Predicate, QueryError> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Predicate::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Predicate, QueryError> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.unary()?;
            lhs = Predicate::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Predicate, QueryError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.unary()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Predicate, QueryError> {
        match self.advance() {
            None => Err(QueryError::UnexpectedEnd),
            Some(Token::LParen) => {
                let inner = self.query()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(QueryError::UnbalancedParenthesis),
                }
            }
            Some(Token::RParen) => Err(QueryError::UnbalancedParenthesis),
            Some(Token::Field(field)) => match self.advance() {
                Some(Token::Term(term)) => term_predicate(field, &term),
                Some(token) => Err(QueryError::UnexpectedToken(token.to_string())),
                None => Err(QueryError::UnexpectedEnd),
            },
            Some(Token::Term(term)) => term_predicate(Field::Account, &term),
            Some(Token::Unsupported(word)) => Err(QueryError::Unsupported(word)),
            Some(token) => Err(QueryError::UnexpectedToken(token.to_string())),
        }
    }
}

fn pattern(text: &str) -> Result<Regex, QueryError> {
    RegexBuilder::new(text)
        .case_insensitive(true)
        .build()
        .map_err(|source| QueryError::InvalidPattern { pattern: text.to_string(), source })
}

fn term_predicate(field: Field, term: &str) -> Result<Predicate, QueryError> {
    Ok(match field {
        Field::Account => Predicate::Account(pattern(term)?),
        Field::Payee => Predicate::Payee(pattern(term)?),
        Field::Code => Predicate::Code(pattern(term)?),
        Field::Note => Predicate::Note(pattern(term)?),
        Field::Tag => match term.split_once('=') {
            Some((name, value)) => Predicate::Tag { name: pattern(name)?, value: Some(pattern(value)?) },
            None => Predicate::Tag { name: pattern(term)?, value: None },
        },
    })
}
