//! Output rendering for streamed answers.
//!
//! A chat session hands its renderer the complete Markdown of the answer on every
//! increment, never a delta.  Renderers decide how much of that to redraw; the session
//! decides when to [`Renderer::flush`].

use std::io::{self, Stdout, Write};

use crate::markdown::markdown_to_html;

/// ANSI escape code for dim text (used for the placeholder).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for cyan text (used for informational lines).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI sequence that returns to column zero and erases the line.
const ANSI_CLEAR_LINE: &str = "\r\x1b[2K";

/// Trait for rendering an assistant answer as it streams in.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling for a terminal
/// - Sanitized HTML for an embedding page
/// - Recording renderers for headless tests
pub trait Renderer: Send {
    /// Called when a request is issued, with the text shown until data arrives.
    fn start_response(&mut self, placeholder: &str) {
        _ = placeholder;
    }

    /// Receives the full Markdown of the answer so far.
    ///
    /// Called on every decoded increment and once more at finalization, so the last call
    /// always carries the final content.
    fn render(&mut self, markdown: &str);

    /// Makes everything rendered so far visible.
    fn flush(&mut self) {}

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called after the answer reached its final state.
    fn finish_response(&mut self) {}
}

/// Plain text renderer with optional ANSI styling.
///
/// Writes to stdout.  When the answer grows by appending, only the new suffix is
/// written; when it is replaced (a failure notice instead of partial text) the whole
/// content is written on a fresh line.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    placeholder_shown: bool,
    printed: String,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            placeholder_shown: false,
            printed: String::new(),
        }
    }

    fn write(&mut self, text: &str) {
        let _ = self.stdout.write_all(text.as_bytes());
    }

    fn clear_placeholder(&mut self) {
        if self.placeholder_shown {
            if self.use_color {
                self.write(ANSI_CLEAR_LINE);
            } else {
                self.write("\n");
            }
            self.placeholder_shown = false;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn start_response(&mut self, placeholder: &str) {
        self.printed.clear();
        if self.use_color {
            self.write(&format!("{ANSI_DIM}{placeholder}{ANSI_RESET}"));
        } else {
            self.write(placeholder);
        }
        self.placeholder_shown = true;
        self.flush();
    }

    fn render(&mut self, markdown: &str) {
        self.clear_placeholder();
        if let Some(delta) = markdown.strip_prefix(self.printed.as_str()) {
            self.write(delta);
        } else {
            self.write("\n");
            self.write(markdown);
        }
        self.printed.clear();
        self.printed.push_str(markdown);
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.flush();
        if self.use_color {
            eprintln!("\n{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("\nError: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        if self.use_color {
            self.write(&format!("{ANSI_CYAN}{info}{ANSI_RESET}\n"));
        } else {
            self.write(&format!("{info}\n"));
        }
        self.flush();
    }

    fn finish_response(&mut self) {
        self.placeholder_shown = false;
        self.printed.clear();
        self.write("\n");
        self.flush();
    }
}

/// Headless renderer that keeps the answer as a sanitized HTML fragment.
///
/// The Markdown is converted on flush, which is where the session's flush cadence
/// applies; `html()` is therefore at most one flush behind `markdown()`.
#[derive(Debug, Default, Clone)]
pub struct HtmlRenderer {
    markdown: String,
    html: String,
    errors: Vec<String>,
    infos: Vec<String>,
    renders: usize,
    flushes: usize,
}

impl HtmlRenderer {
    /// Creates an empty HTML renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent Markdown passed to `render`.
    pub fn markdown(&self) -> &str {
        &self.markdown
    }

    /// The HTML produced by the most recent flush.
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Errors reported through `print_error`, oldest first.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Messages reported through `print_info`, oldest first.
    pub fn infos(&self) -> &[String] {
        &self.infos
    }

    /// Number of `render` calls since creation.
    pub fn render_count(&self) -> usize {
        self.renders
    }

    /// Number of `flush` calls since creation.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl Renderer for HtmlRenderer {
    fn start_response(&mut self, placeholder: &str) {
        self.markdown = placeholder.to_string();
        self.html = markdown_to_html(placeholder);
    }

    fn render(&mut self, markdown: &str) {
        self.renders += 1;
        self.markdown.clear();
        self.markdown.push_str(markdown);
    }

    fn flush(&mut self) {
        self.flushes += 1;
        self.html = markdown_to_html(&self.markdown);
    }

    fn print_error(&mut self, error: &str) {
        self.errors.push(error.to_string());
    }

    fn print_info(&mut self, info: &str) {
        self.infos.push(info.to_string());
    }

    fn finish_response(&mut self) {
        self.flush();
    }
}
