//! Line-oriented prompts over any reader/writer pair.

use std::io::{BufRead, Write};

use pgseed_core::is_hyphenated_uuid;
use uuid::Uuid;

use crate::WizardError;

pub struct Console<R, W> {
    input: R,
    output: W,
    exhausted: bool,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            exhausted: false,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Prints one line.
    pub fn say(&mut self, line: impl AsRef<str>) -> Result<(), WizardError> {
        writeln!(self.output, "{}", line.as_ref())?;
        Ok(())
    }

    /// Prints `text` without a newline and returns the trimmed answer.
    pub fn prompt(&mut self, text: &str) -> Result<String, WizardError> {
        write!(self.output, "{text}")?;
        self.output.flush()?;
        match self.read_line()? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(WizardError::InputClosed),
        }
    }

    /// Reads lines until the first blank one (or end of input) and returns the
    /// trimmed non-empty lines. Fails if input was already exhausted.
    pub fn read_block(&mut self) -> Result<Vec<String>, WizardError> {
        if self.exhausted {
            return Err(WizardError::InputClosed);
        }
        let mut lines = Vec::new();
        while let Some(line) = self.read_line()? {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            lines.push(line.to_string());
        }
        Ok(lines)
    }

    pub fn ask_yes_no(&mut self, text: &str) -> Result<bool, WizardError> {
        loop {
            match self.prompt(text)?.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("  ⚠ Please enter 'y' or 'n'.")?,
            }
        }
    }

    pub fn ask_positive_integer(&mut self, text: &str) -> Result<usize, WizardError> {
        loop {
            match self.prompt(text)?.parse::<i64>() {
                Ok(value) if value > 0 => return Ok(value as usize),
                Ok(_) => self.say("  ⚠ Please enter a positive number.")?,
                Err(_) => self.say("  ⚠ Invalid input. Please enter a valid number.")?,
            }
        }
    }

    pub fn ask_uuid(&mut self, text: &str) -> Result<Uuid, WizardError> {
        loop {
            let value = self.prompt(text)?;
            if is_hyphenated_uuid(&value) {
                if let Ok(id) = Uuid::parse_str(&value) {
                    return Ok(id);
                }
            }
            self.say("  ⚠ Invalid UUID format. Expected: xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx")?;
        }
    }

    fn read_line(&mut self) -> Result<Option<String>, WizardError> {
        if self.exhausted {
            return Ok(None);
        }
        let mut buf = String::new();
        if self.input.read_line(&mut buf)? == 0 {
            self.exhausted = true;
            return Ok(None);
        }
        Ok(Some(buf))
    }
}
