//! Utility functions shared by the library and the CLI.
//!
//! - **URL validation**: refuse non-public feed URLs before anything is fetched
//! - **Text processing**: markup cleanup, terminal sanitizing, width-aware truncation

mod text;
mod url_validator;

pub use text::{clean_html, display_width, strip_control_chars, truncate_to_width};
pub use url_validator::{validate_url, UrlValidationError};
