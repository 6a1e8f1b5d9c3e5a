use std::path::{Path, PathBuf};

use crate::error::UserInputError;
use crate::resolver::{base_name, validate_arxiv_id};
use crate::transcript::validate_log_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Clear,
    FetchArxiv(String),
    UploadFile(PathBuf),
    Delete(String),
    LoadLog(String),
    Chat(String),
}

impl Command {
    /// Parses one input line. Control words are case-sensitive; anything that
    /// is not a control command is a chat query.
    pub fn parse(line: &str) -> Result<Self, UserInputError> {
        match line {
            "Quit" => return Ok(Self::Quit),
            "Clear" => return Ok(Self::Clear),
            _ => {}
        }

        if let Some(rest) = line.strip_prefix("arxiv:") {
            let id = required(rest, "arxiv:", "arxiv:2311.11100")?;
            validate_arxiv_id(id)?;
            return Ok(Self::FetchArxiv(id.to_string()));
        }
        if let Some(rest) = line.strip_prefix("file:") {
            let path = strip_quotes(required(rest, "file:", "file:files/HowtoReadPaper.pdf")?);
            let path = required(path, "file:", "file:files/HowtoReadPaper.pdf")?;
            return Ok(Self::UploadFile(PathBuf::from(path)));
        }
        if let Some(rest) = line.strip_prefix("delete:") {
            let target = required(rest, "delete:", "delete:2311.11100.pdf")?;
            let file_name = base_name(Path::new(target));
            let file_name = required(&file_name, "delete:", "delete:2311.11100.pdf")?;
            return Ok(Self::Delete(file_name.to_string()));
        }
        if let Some(rest) = line.strip_prefix("load-log:") {
            let name = required(rest, "load-log:", "load-log:2024-08-19_15-56-26")?;
            validate_log_name(name)?;
            return Ok(Self::LoadLog(name.to_string()));
        }

        Ok(Self::Chat(line.to_string()))
    }
}

fn required<'a>(
    raw: &'a str,
    command: &'static str,
    example: &'static str,
) -> Result<&'a str, UserInputError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(UserInputError::MissingArgument { command, example });
    }
    Ok(value)
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
