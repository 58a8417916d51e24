use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::error::PromptError;

type Result<T> = std::result::Result<T, PromptError>;

fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask for a path to an existing file, re-asking until one is given
pub fn prompt_file<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &'static str) -> Result<PathBuf> {
    loop {
        writeln!(output, "Enter {label} path")?;
        output.flush()?;

        let Some(line) = read_line(input)? else {
            return Err(PromptError::Eof(label));
        };
        let path = PathBuf::from(&line);
        if !line.is_empty() && path.is_file() {
            return Ok(path);
        }
        writeln!(output, "No file at '{line}', try again")?;
    }
}

/// Like `prompt_file`, but an empty answer or closed input means "none"
pub fn prompt_optional_file<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &'static str,
) -> Result<Option<PathBuf>> {
    loop {
        writeln!(output, "Enter {label} path (leave empty to skip)")?;
        output.flush()?;

        let Some(line) = read_line(input)? else {
            return Ok(None);
        };
        if line.is_empty() {
            return Ok(None);
        }
        let path = PathBuf::from(&line);
        if path.is_file() {
            return Ok(Some(path));
        }
        writeln!(output, "No file at '{line}', try again")?;
    }
}

/// Print the available fields and ask until one of them is chosen
pub fn prompt_field<R: BufRead, W: Write>(input: &mut R, output: &mut W, fields: &[String]) -> Result<String> {
    loop {
        writeln!(output, "Enter a field: ")?;
        writeln!(output, "{}", fields.join(", "))?;
        output.flush()?;

        let Some(line) = read_line(input)? else {
            return Err(PromptError::Eof("field"));
        };
        if fields.iter().any(|f| *f == line) {
            return Ok(line);
        }
        writeln!(output, "'{line}' is not one of the available fields")?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fields() -> Vec<String> {
        vec!["density".to_string(), "temperature".to_string()]
    }

    #[test]
    fn field_prompt_reasks_until_valid() {
        let mut input = Cursor::new("pressure\n  density \n");
        let mut output = Vec::new();

        let field = prompt_field(&mut input, &mut output, &fields()).unwrap();
        assert_eq!(field, "density");

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("'pressure' is not one of the available fields"));
        assert!(printed.contains("density, temperature"));
    }

    #[test]
    fn field_prompt_eof_is_error() {
        let mut input = Cursor::new("nope\n");
        let mut output = Vec::new();
        let err = prompt_field(&mut input, &mut output, &fields()).unwrap_err();
        assert!(matches!(err, PromptError::Eof("field")));
    }

    #[test]
    fn file_prompt_accepts_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let answer = format!("/no/such/file\n{}\n", file.path().display());
        let mut input = Cursor::new(answer);
        let mut output = Vec::new();

        let path = prompt_file(&mut input, &mut output, "simulation file").unwrap();
        assert_eq!(path, file.path());
        assert!(String::from_utf8(output).unwrap().contains("No file at '/no/such/file'"));
    }

    #[test]
    fn optional_file_prompt_allows_empty() {
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();
        let path = prompt_optional_file(&mut input, &mut output, "particle file").unwrap();
        assert_eq!(path, None);
    }

    #[test]
    fn optional_file_prompt_skips_on_closed_input() {
        let mut input = Cursor::new("/no/such/particles\n");
        let mut output = Vec::new();
        let path = prompt_optional_file(&mut input, &mut output, "particle file").unwrap();
        assert_eq!(path, None);
        assert!(String::from_utf8(output).unwrap().contains("No file at '/no/such/particles'"));
    }
}
