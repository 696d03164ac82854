//! Error message formatting with actionable suggestions.

use std::error::Error;

use portico_core::error::PorticoError;

use super::colors::ColorSupport;

/// Error formatter with suggestions
pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self::with_colors(ColorSupport::detect())
    }

    pub fn with_colors(colors: ColorSupport) -> Self {
        Self { colors }
    }

    /// Format a Portico error with its suggestion and source chain
    pub fn format_error(&self, error: &PorticoError) -> String {
        let mut output = self.format_simple(&error.to_string());
        output.push('\n');

        if let Some(suggestion) = error.suggestion() {
            output.push('\n');
            output.push_str(&self.colors.dim("help"));
            output.push_str(": ");
            output.push_str(suggestion);
            output.push('\n');
        }

        let mut source = error.source();
        while let Some(err) = source {
            output.push('\n');
            output.push_str(&self.caused_by(&err.to_string()));
            source = err.source();
        }

        output
    }

    /// Format any error chain: the outermost message, then each cause
    pub fn format_chain(&self, error: &anyhow::Error) -> String {
        let mut chain = error.chain();
        let mut output = match chain.next() {
            Some(top) => self.format_simple(&top.to_string()),
            None => self.format_simple("unknown error"),
        };
        for cause in chain {
            output.push('\n');
            output.push_str(&self.caused_by(&cause.to_string()));
        }
        output
    }

    pub fn format_simple(&self, message: &str) -> String {
        format!("{}: {}", self.colors.red("error"), message)
    }

    fn caused_by(&self, message: &str) -> String {
        format!("{}: {}", self.colors.dim("caused by"), message)
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}
