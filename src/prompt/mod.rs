use std::io::{BufRead, Write};

use crate::catalog::{Catalog, FormatOption};
use crate::{DownloaderError, Result};

const PROMPT: &str = "\n🎯 Choose the format number you want to download: ";

/// Ask for an ordinal until a valid one is entered.
///
/// Re-prompts on non-numeric and out-of-range input; end of input is an
/// error so a closed stdin never loops.
pub fn choose_format<'a, R, W>(catalog: &'a Catalog, input: &mut R, output: &mut W) -> Result<&'a FormatOption>
where
    R: BufRead,
    W: Write,
{
    let mut line = String::new();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(DownloaderError::InputClosed.into());
        }

        let choice = match line.trim().parse::<usize>() {
            Ok(choice) => choice,
            Err(_) => {
                writeln!(output, "❌ Please enter a valid number.")?;
                continue;
            }
        };

        match catalog.select(choice) {
            Ok(option) => return Ok(option),
            Err(e) => {
                tracing::debug!("Rejected selection: {}", e);
                writeln!(output, "❌ Invalid number. Try again.")?;
            }
        }
    }
}
