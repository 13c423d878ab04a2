//! `#!` header parsing for setuid scripts
//!
//! Header layout:
//!
//! ```text
//! #!/usr/bin/exec-suid [OPTIONS] -- /usr/bin/python3 -I
//! ```
//!
//! Tokens before `--` are the interpreter and its options, tokens after it
//! are the command the script is finally handed to.

use std::io::BufRead;

use suid_core::ShebangError;

/// Longest header line accepted, newline included
pub const HEADER_SIZE: usize = 1024;

/// Parsed `#!` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShebangHeader {
    /// Interpreter path followed by its options
    pub interpreter: Vec<String>,
    /// Command prefix the script path is appended to
    pub command: Vec<String>,
}

impl ShebangHeader {
    /// Path of the interpreter named in the header
    pub fn interpreter_path(&self) -> &str {
        &self.interpreter[0]
    }

    /// Options given to the interpreter
    pub fn interpreter_options(&self) -> &[String] {
        &self.interpreter[1..]
    }
}

/// Parse the first line of `reader`.
pub fn parse_header(reader: impl BufRead) -> Result<ShebangHeader, ShebangError> {
    let mut line = Vec::with_capacity(HEADER_SIZE);
    reader
        .take(HEADER_SIZE as u64)
        .read_until(b'\n', &mut line)?;

    if !line.starts_with(b"#!") {
        return Err(ShebangError::MissingMagic);
    }
    if line.last() != Some(&b'\n') {
        return Err(ShebangError::Unterminated);
    }

    let text = String::from_utf8_lossy(&line[2..]);
    let mut tokens: Vec<String> = text
        .split([' ', '\t', '\n'])
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect();

    let split = tokens
        .iter()
        .position(|t| t == "--")
        .ok_or(ShebangError::MissingSeparator)?;
    let command = tokens.split_off(split + 1);
    tokens.truncate(split);

    if tokens.is_empty() {
        return Err(ShebangError::MissingInterpreter);
    }
    if command.is_empty() {
        return Err(ShebangError::MissingCommand);
    }

    Ok(ShebangHeader {
        interpreter: tokens,
        command,
    })
}
