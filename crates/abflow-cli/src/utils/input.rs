use crate::error::{CliError, Result};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, IsTerminal, Write};
use std::path::Path;

/// Returns `args` if any were given, otherwise one tag per non-blank stdin line.
pub fn tags_from_args_or_stdin(args: Vec<String>, what: &str) -> Result<Vec<String>> {
    if !args.is_empty() {
        return Ok(args);
    }
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(CliError::Argument(format!(
            "No {what} provided. Provide them as arguments or pipe them via stdin."
        )));
    }
    let tags = read_tags(stdin.lock())?;
    if tags.is_empty() {
        return Err(CliError::Argument(format!("No {what} provided")));
    }
    Ok(tags)
}

pub fn read_tags(reader: impl BufRead) -> Result<Vec<String>> {
    let mut tags = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let tag = line.trim();
        if !tag.is_empty() {
            tags.push(tag.to_string());
        }
    }
    Ok(tags)
}

/// Runs `write` against `path`, or stdout when no path is given.
pub fn with_output<F>(path: Option<&Path>, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    match path {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            write(&mut writer)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write(&mut writer)?;
            writer.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_and_padding_are_dropped() {
        let tags = read_tags("a\n\n  b  \n\t\nc".as_bytes()).unwrap();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn explicit_arguments_win_over_stdin() {
        let tags = tags_from_args_or_stdin(vec!["x".into()], "tags").unwrap();
        assert_eq!(tags, vec!["x"]);
    }

    #[test]
    fn output_goes_to_the_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        with_output(Some(&path), |w| {
            writeln!(w, "hello")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello\n");
    }
}
