mod code;
mod logger;
mod position;

use once_cell::unsync::OnceCell;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
/// A 1-based line and column pair recovered from a byte offset or token index.
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Owns the filename and raw source text of one loaded program.
///
/// Text is stored once, and the byte offsets of line breaks are computed
/// lazily and cached, since most tokenizations never need a position at
/// all.
pub struct SourceText {
    pub filename: String,
    pub text: String,
    line_starts: OnceCell<Vec<usize>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Leveled trace output gated behind `cfg(debug_assertions)`.
pub enum Trace {
    None,
    Default,
    Success,
    Result,
    Verbose,
}
