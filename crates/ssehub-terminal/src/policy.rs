//! Command policy: tokenizing, metacharacter and whitelist checks.
//!
//! Programs are spawned directly, never through a shell, so pipes and
//! redirections would not work anyway. Tokens that look like them are still
//! refused up front rather than handed to the program as arguments.

use ssehub_core::{Error, Result};

/// Characters that may not start a token.
const SHELL_METACHARACTERS: [char; 4] = ['|', '&', '>', '<'];

/// A tokenized, approved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Program name, first token
    pub program: String,
    /// Remaining tokens
    pub args: Vec<String>,
}

/// Result of checking a submitted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Blank input
    Empty,
    /// The line may be executed
    Command(CommandLine),
    /// The line was refused; `program` is what to name in the message
    Rejected {
        /// First word of the line
        program: String,
    },
}

/// Whitelist of runnable programs.
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    allowed: Vec<String>,
}

impl CommandPolicy {
    /// Create a policy. An empty list allows nothing.
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// Whether `program` is whitelisted.
    pub fn is_allowed(&self, program: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == program)
    }

    /// Tokenize a terminal line with shell-style quoting and check it.
    pub fn parse_line(&self, line: &str) -> ParsedLine {
        let Some(words) = shlex::split(line) else {
            // Unbalanced quotes
            let program = line.split_whitespace().next().unwrap_or_default();
            return ParsedLine::Rejected {
                program: program.to_string(),
            };
        };

        let Some((program, args)) = words.split_first() else {
            return ParsedLine::Empty;
        };

        if words.iter().any(|word| has_shell_metacharacter(word)) || !self.is_allowed(program) {
            return ParsedLine::Rejected {
                program: program.clone(),
            };
        }

        ParsedLine::Command(CommandLine {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Check an already tokenized request.
    pub fn check(&self, program: &str, args: &[String]) -> Result<()> {
        if !self.is_allowed(program) {
            return Err(Error::Forbidden(format!("{program} is not whitelisted")));
        }
        if let Some(arg) = args.iter().find(|arg| has_shell_metacharacter(arg)) {
            return Err(Error::Forbidden(format!(
                "argument {arg:?} starts with a shell metacharacter"
            )));
        }
        Ok(())
    }
}

/// Whether a token starts with a pipe, background or redirection character.
pub fn has_shell_metacharacter(token: &str) -> bool {
    token.starts_with(SHELL_METACHARACTERS)
}
