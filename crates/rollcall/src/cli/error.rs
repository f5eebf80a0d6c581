//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use rollcall_protocol::Day;
use rollcall_station::PermissionError;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// The operator may not scan for the requested day or purpose
    pub fn permission_denied(err: &PermissionError, allowed: &[(Day, Vec<&str>)]) -> Self {
        let mut error = Self::new(err.to_string());
        match err {
            PermissionError::NoOperator => {
                error = error
                    .with_context("Scans are attributed to the operator signed in at the station")
                    .with_suggestions([
                        "TRY: Pass the operator: rollcall scan --day 1 --user <name>",
                        "TRY: Or set `user = \"<name>\"` in the config file",
                    ]);
            }
            PermissionError::DayNotAllowed { .. } | PermissionError::PurposeNotAllowed { .. } => {
                error = error.with_context("The operator's profile limits what they may record");
                let options: Vec<String> = allowed
                    .iter()
                    .filter(|(_, purposes)| !purposes.is_empty())
                    .map(|(day, purposes)| format!("TRY: Day {}: {}", day, purposes.join(", ")))
                    .collect();
                if options.is_empty() {
                    error = error.with_suggestion("TRY: Ask the coordinator to extend the profile");
                } else {
                    error = error.with_suggestions(options);
                }
            }
        }
        error
    }

    /// No delegates loaded; every scan would be invalid
    pub fn empty_roster() -> Self {
        Self::new("The delegate roster is empty")
            .with_context("Every scanned id would be rejected as invalid")
            .with_suggestions([
                "TRY: Import delegates: rollcall roster import delegates.csv",
                "TRY: Check `store_url` points at the shared record store: rollcall config",
            ])
    }

    /// The record store could not be opened
    pub fn store_unavailable(url: &str, reason: &str) -> Self {
        Self::new(format!("Cannot open record store: {}", url))
            .with_context(reason.to_string())
            .with_suggestions([
                "TRY: Check the path in `store_url` exists and is writable".to_string(),
                "TRY: Keep scanning offline: rollcall scan --offline ...".to_string(),
            ])
    }

    /// The offline queue directory could not be opened
    pub fn queue_unavailable(dir: &Path, reason: &str) -> Self {
        Self::new(format!("Cannot open offline queue: {}", dir.display()))
            .with_context(reason.to_string())
            .with_suggestions([
                format!("TRY: Check directory permissions: ls -la {}", dir.display()),
                "TRY: Point `queue_dir` somewhere writable in the config file".to_string(),
            ])
    }

    /// CSV parsing error
    pub fn csv_parse_error(path: &Path, line: u64, details: &str) -> Self {
        Self::new(format!("CSV parse error at line {}: {}", line, details))
            .with_context(format!("Failed to parse roster file: {}", path.display()))
            .with_suggestions([
                "TRY: The header row must name `id` and `name` (optionally `organization`)"
                    .to_string(),
                format!(
                    "TRY: Inspect the raw file: head -n {} {}",
                    line + 5,
                    path.display()
                ),
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Render `err` as a JSON object on stdout for `--json` callers.
pub fn print_json_error(err: &anyhow::Error) {
    let value = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({
            "error": err.to_string(),
            "context": err.chain().skip(1).map(|c| c.to_string()).collect::<Vec<_>>().join(": "),
            "suggestions": Vec::<String>::new(),
        }),
    };
    println!("{}", value);
}
