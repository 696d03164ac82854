//! Terminal output formatting and utilities.
//!
//! Keeps command output consistent: dim informational lines, colored
//! markers for health states and HTTP status lines.

use portico_runtime::ServiceHealth;

pub mod colors;
pub mod errors;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: colors::ColorSupport,
}

impl OutputHandler {
    /// Create a new output handler
    pub fn new() -> Self {
        Self::with_colors(colors::ColorSupport::detect())
    }

    pub fn with_colors(colors: colors::ColorSupport) -> Self {
        Self { colors }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        println!("{}", self.colors.dim(message));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        println!("{} {}", self.colors.green("✓"), message);
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        println!("{} {}", self.colors.yellow("⚠"), message);
    }

    /// Print a step message with a leading marker
    pub fn step(&self, marker: &str, message: &str) {
        println!("{} {}", marker, message);
    }

    /// Print one service's health line
    pub fn health(&self, name: &str, health: &ServiceHealth) {
        println!("{}", self.health_line(name, health));
    }

    /// Print an HTTP status line
    pub fn status(&self, status: u16, status_text: &str) {
        println!("{}", self.status_line(status, status_text));
    }

    fn health_line(&self, name: &str, health: &ServiceHealth) -> String {
        let marker = match health {
            ServiceHealth::Healthy => self.colors.green("✓"),
            ServiceHealth::Unknown => self.colors.dim("?"),
            ServiceHealth::Error(_) => self.colors.red("✗"),
        };
        format!("{} {}: {}", marker, self.colors.bold(name), health)
    }

    fn status_line(&self, status: u16, status_text: &str) -> String {
        let line = if status_text.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {} {}", status, status_text)
        };
        self.colors.for_status(status, &line)
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
