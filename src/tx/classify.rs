//! Mapping from raw ledger error text to the categories the sender acts on
//!
//! The match is exact string equality. The default table carries the sentences
//! emitted by go-ethereum nodes; other ledgers can supply their own table.

use crate::error::LedgerError;

use serde::Deserialize;

pub const NOT_FOUND_MESSAGE: &str = "not found";
pub const UNDERPRICED_MESSAGE: &str = "replacement transaction underpriced";
pub const NONCE_TOO_LOW_MESSAGE: &str = "nonce too low";
pub const ALREADY_KNOWN_MESSAGE: &str = "already known";

/// Closed set of error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Another transaction holds this nonce at a competitive price
    Underpriced,
    /// The nonce has already been used on chain
    NonceTooLow,
    /// The node already holds this exact signed transaction
    AlreadyKnown,
    /// No receipt exists for the hash
    NotFound,
    /// Anything unrecognized; always terminal
    Other,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Underpriced => "underpriced",
            ErrorClass::NonceTooLow => "nonce_too_low",
            ErrorClass::AlreadyKnown => "already_known",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Other => "other",
        }
    }
}

/// Exact-text classification table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorTable {
    entries: Vec<(String, ErrorClass)>,
}

impl ErrorTable {
    /// Empty table: everything classifies as `Other`
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Map `message` to `class`, replacing any previous sentence for that class
    pub fn with_entry(mut self, message: impl Into<String>, class: ErrorClass) -> Self {
        self.entries.retain(|(_, c)| *c != class);
        self.entries.push((message.into(), class));
        self
    }

    pub fn classify(&self, err: &LedgerError) -> ErrorClass {
        self.entries
            .iter()
            .find(|(message, _)| message == err.message())
            .map(|(_, class)| *class)
            .unwrap_or(ErrorClass::Other)
    }
}

impl Default for ErrorTable {
    fn default() -> Self {
        Self::empty()
            .with_entry(NOT_FOUND_MESSAGE, ErrorClass::NotFound)
            .with_entry(UNDERPRICED_MESSAGE, ErrorClass::Underpriced)
            .with_entry(NONCE_TOO_LOW_MESSAGE, ErrorClass::NonceTooLow)
            .with_entry(ALREADY_KNOWN_MESSAGE, ErrorClass::AlreadyKnown)
    }
}

/// Per-sentence overrides read from the `[errors]` config section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorMessagesConfig {
    pub not_found: Option<String>,
    pub underpriced: Option<String>,
    pub nonce_too_low: Option<String>,
    pub already_known: Option<String>,
}

impl From<&ErrorMessagesConfig> for ErrorTable {
    fn from(config: &ErrorMessagesConfig) -> Self {
        let overrides = [
            (&config.not_found, ErrorClass::NotFound),
            (&config.underpriced, ErrorClass::Underpriced),
            (&config.nonce_too_low, ErrorClass::NonceTooLow),
            (&config.already_known, ErrorClass::AlreadyKnown),
        ];

        overrides
            .into_iter()
            .fold(ErrorTable::default(), |table, (message, class)| match message {
                Some(message) => table.with_entry(message.clone(), class),
                None => table,
            })
    }
}
