//! Terminal output and prompts.

use std::{error::Error, io::IsTerminal, path::Path};

use colored::Colorize;

use crate::error::{Result, StencilError};

#[derive(Debug, Clone, Copy)]
pub struct Console {
    quiet: bool,
    interactive: bool,
}

impl Console {
    pub fn new(quiet: bool, interactive: bool) -> Self {
        Self { quiet, interactive }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive && std::io::stdin().is_terminal()
    }

    pub fn success(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{} {}", "✔".green().bold(), message.as_ref());
        }
    }

    pub fn failure(&self, message: impl AsRef<str>) {
        eprintln!("{} {}", "✘".red().bold(), message.as_ref());
    }

    /// Print the would-be contents of `path` under a DRY RUN banner.
    pub fn dry_run(&self, path: &Path, contents: &str) {
        println!(
            "{} Rendered contents of {}:",
            " DRY RUN ".black().on_yellow().bold(),
            path.display().to_string().cyan()
        );
        println!();
        for line in contents.lines() {
            println!("  {line}");
        }
        println!();
    }

    /// Ask a yes/no question. Declines without asking when the session is not
    /// interactive.
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if !self.is_interactive() {
            return Ok(false);
        }
        cliclack::confirm(prompt)
            .initial_value(false)
            .interact()
            .map_err(|e| StencilError::io("reading confirmation", e))
    }
}

/// `outer: inner: innermost`, for reporting errors that are not propagated.
pub fn error_chain(err: &dyn Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn chain_includes_io_cause() {
        let err = StencilError::io(
            "writing out.yaml",
            io::Error::other("disk full"),
        );
        assert_eq!(error_chain(&err), "writing out.yaml: disk full");
    }

    #[test]
    fn non_interactive_console_declines() {
        let console = Console::new(true, false);
        assert!(!console.confirm("Continue?").unwrap());
    }
}
