//! Interactive flows for the form field mapping and category tools.

use pgseed_storage::StoreError;
use thiserror::Error;

pub mod category_tree;
pub mod console;
pub mod form_mapping;

pub use category_tree::{run_category_session, CategoryReport};
pub use console::Console;
pub use form_mapping::{run_form_mapping, MappingReport};

pub const CRATE_NAME: &str = "pgseed-wizard";

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("input closed before the session finished")]
    InputClosed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Prints a `=`-ruled title block.
pub(crate) fn section<R, W>(console: &mut Console<R, W>, title: &str) -> Result<(), WizardError>
where
    R: std::io::BufRead,
    W: std::io::Write,
{
    let rule = "=".repeat(60);
    console.say(format!("\n{rule}"))?;
    console.say(title)?;
    console.say(rule)
}
