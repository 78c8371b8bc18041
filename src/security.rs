//! Security utilities for the Squehub framework
//!
//! HTML escaping for template output, view name validation for the view
//! resolver, and CSRF protection (see [`csrf`]).

use crate::error::{Error, Result};

pub mod csrf;

pub use csrf::{CsrfConfig, CsrfMiddleware};

/// HTML escaping utility to prevent XSS attacks
pub struct HtmlEscaper;

impl HtmlEscaper {
    /// Escape the five HTML special characters
    ///
    /// Output matches the `htmlspecialchars` quote-escaping convention used by
    /// templates: `& < > " '` become `&amp; &lt; &gt; &quot; &#039;`.
    pub fn escape(input: &str) -> String {
        let mut result = String::with_capacity(input.len() + input.len() / 8);
        for c in input.chars() {
            match c {
                '&' => result.push_str("&amp;"),
                '<' => result.push_str("&lt;"),
                '>' => result.push_str("&gt;"),
                '"' => result.push_str("&quot;"),
                '\'' => result.push_str("&#039;"),
                c => result.push(c),
            }
        }
        result
    }

    /// Escape HTML attributes
    pub fn escape_attribute(input: &str) -> String {
        Self::escape(input)
            .replace('=', "&#x3D;")
            .replace('`', "&#x60;")
    }

    /// Insert `<br />` before every newline, like `nl2br`
    pub fn nl2br(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\r' if chars.peek() == Some(&'\n') => {
                    chars.next();
                    result.push_str("<br />\r\n");
                }
                '\r' | '\n' => {
                    result.push_str("<br />");
                    result.push(c);
                }
                c => result.push(c),
            }
        }
        result
    }
}

/// Validate a dotted logical view name before it is turned into a path
///
/// Rejects empty names, empty segments and any segment that could climb out
/// of a view root.
pub fn validate_view_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::template("View name cannot be empty"));
    }
    for segment in name.split(['.', '/']) {
        if segment.is_empty() || segment == ".." || segment.contains('\\') || segment.contains('\0')
        {
            return Err(Error::template(format!("Invalid view name '{}'", name)));
        }
    }
    Ok(())
}
