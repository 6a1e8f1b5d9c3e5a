use std::path::PathBuf;

/// Mistakes in what the user typed. The current command is abandoned and the
/// conversation is left as it was.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UserInputError {
    #[error("'{command}' needs an argument, e.g. '{example}'")]
    MissingArgument {
        command: &'static str,
        example: &'static str,
    },
    #[error("invalid log name '{0}': use a plain name such as 2024-08-19_15-56-26")]
    InvalidLogName(String),
    #[error("File {} not found.", .0.display())]
    FileNotFound(PathBuf),
    #[error("invalid arXiv id '{0}': use an id such as 2311.11100 or hep-th/9901001")]
    InvalidArxivId(String),
    #[error("Haven't found paper for arXiv id '{0}'")]
    PaperNotFound(String),
    #[error("arXiv entry for '{0}' has no PDF link")]
    NoPdfLink(String),
}
