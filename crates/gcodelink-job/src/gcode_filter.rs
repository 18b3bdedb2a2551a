//! G-code comment filtering for program streaming
//!
//! A program line is sent only if it carries a command once comments are
//! removed. Full-line comments start with `;` or `(`; an inline comment
//! cuts the line at the first `;` or `(`.

use crate::program_source::ProgramHandle;
use gcodelink_core::JobError;

/// Reduce a raw program line to the command that should be sent
///
/// Returns `None` for blank lines and comment-only lines. Applying the
/// filter to its own output yields the same command.
pub fn eligible_command(raw: &str) -> Option<&str> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with([';', '(']) {
        return None;
    }

    let command = match line.find([';', '(']) {
        Some(idx) => line[..idx].trim_end(),
        None => line,
    };

    if command.is_empty() {
        None
    } else {
        Some(command)
    }
}

/// Count eligible commands remaining in a handle, consuming it
pub fn count_eligible(handle: &mut dyn ProgramHandle) -> Result<usize, JobError> {
    let mut count = 0;
    while let Some(line) = handle.next_line()? {
        if eligible_command(&line).is_some() {
            count += 1;
        }
    }
    Ok(count)
}
