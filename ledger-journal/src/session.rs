//! Session configuration
//!
//! A session gathers default report options from `LEDGER_*` environment
//! variables and from an init file, remembers which journal files to read,
//! and owns the journal once it has been read.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::Result;
use crate::journal::Journal;
use crate::parser::LoadError;
use crate::query::split_arguments;
use crate::report::is_report_option;

/// Default options and journal sources for reports
#[derive(Debug, Default)]
pub struct Session {
    defaults: Vec<String>,
    journal_files: Vec<PathBuf>,
    journal: Option<Journal>,
}

impl Session {
    /// A session with no defaults and no journal files
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a session from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env::vars())
    }

    /// Configure a session from `(name, value)` pairs
    ///
    /// `LEDGER_FILE` names a journal file and `LEDGER_INIT` an init file;
    /// every other `LEDGER_NAME` becomes the default option `--name=value`,
    /// with underscores turned into dashes.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut session = Self::new();
        let mut init_file = None;
        let mut vars: Vec<(String, String)> = vars
            .into_iter()
            .map(|(key, value)| (key.as_ref().to_string(), value.as_ref().to_string()))
            .filter(|(key, _)| key.starts_with("LEDGER_"))
            .collect();
        vars.sort();

        for (key, value) in vars {
            match key.as_str() {
                "LEDGER_FILE" => session.journal_files.push(PathBuf::from(value)),
                "LEDGER_INIT" => init_file = Some(PathBuf::from(value)),
                _ => {
                    let name = key["LEDGER_".len()..].to_lowercase().replace('_', "-");
                    if !is_report_option(&name) {
                        warn!("ignoring {}: --{} is not a report option", key, name);
                        continue;
                    }
                    debug!("default option --{} from {}", name, key);
                    session.defaults.push(format!("--{}={}", name, value));
                }
            }
        }

        if let Some(path) = init_file {
            session.load_init_file(&path)?;
        }
        Ok(session)
    }

    /// Read default options from an init file
    ///
    /// Blank lines and lines starting with `;` or `#` are ignored; every
    /// other line is split into arguments like a command line.
    pub fn load_init_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
        info!("reading init file {}", path.display());

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            self.defaults.extend(split_arguments(line));
        }
        Ok(())
    }

    /// Add a default report argument
    pub fn add_default(&mut self, arg: impl Into<String>) {
        self.defaults.push(arg.into());
    }

    /// Default report arguments, applied before any query
    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Add a journal file to read
    pub fn add_journal_file(&mut self, path: impl Into<PathBuf>) {
        self.journal_files.push(path.into());
    }

    /// Journal files to read, in order
    pub fn journal_files(&self) -> &[PathBuf] {
        &self.journal_files
    }

    /// Read every configured journal file into a fresh session journal
    pub fn read_journal(&mut self) -> Result<&Journal> {
        let mut journal = Journal::new();
        for path in &self.journal_files {
            journal.read(path)?;
        }
        info!("session journal holds {} transaction(s)", journal.len());
        Ok(&*self.journal.insert(journal))
    }

    /// The journal read by [`read_journal`](Self::read_journal), if any
    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_vars() {
        let session = Session::from_vars([
            ("LEDGER_FILE", "/tmp/main.ledger"),
            ("LEDGER_BEGIN", "2024-01-01"),
            ("LEDGER_AUX_DATE", "true"),
            ("HOME", "/root"),
        ])
        .unwrap();
        assert_eq!(session.journal_files(), &[PathBuf::from("/tmp/main.ledger")]);
        assert_eq!(session.defaults(), &["--aux-date=true", "--begin=2024-01-01"]);
    }

    #[test]
    fn test_unknown_variables_are_ignored() {
        let session = Session::from_vars([
            ("LEDGER_COLOR", "true"),
            ("LEDGER_PAGER", "less"),
            ("LEDGER_CLEARED", "true"),
        ])
        .unwrap();
        assert_eq!(session.defaults(), &["--cleared=true"]);
    }

    #[test]
    fn test_init_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "; defaults for reports").unwrap();
        writeln!(file, "--begin 2024-01-01").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "# cleared only").unwrap();
        writeln!(file, "--cleared").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let session = Session::from_vars([("LEDGER_INIT", path.as_str())]).unwrap();
        assert_eq!(session.defaults(), &["--begin", "2024-01-01", "--cleared"]);
    }

    #[test]
    fn test_missing_init_file() {
        let result = Session::from_vars([("LEDGER_INIT", "/nonexistent/ledgerrc")]);
        assert!(matches!(result, Err(crate::error::JournalError::Load(LoadError::Io { .. }))));
    }

    #[test]
    fn test_read_journal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "2024/01/01 Opening\n    Assets:Cash    $100\n    Equity:Opening\n").unwrap();

        let mut session = Session::new();
        assert!(session.journal().is_none());
        session.add_journal_file(file.path());
        let journal = session.read_journal().unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.sources().len(), 1);
        assert!(session.journal().is_some());
    }
}
