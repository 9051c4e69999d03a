use std::{fmt, io, path::PathBuf};

use thiserror::Error;

pub type Result<T, E = StencilError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StencilError {
    #[error("The file or directory '{}' does not exist.", .0.display())]
    FileNotFound(PathBuf),

    #[error("The rendered file '{}' already exists, use --force to overwrite.", .0.display())]
    FileAlreadyExists(PathBuf),

    #[error("Undefined variable ${name} in {file}. Did you pass the --{flag} option or use camel case for this variable?")]
    UndefinedVariable {
        name: String,
        flag: String,
        file: String,
    },

    #[error("{0}")]
    InvalidOption(String),

    #[error("The save directory '{}' is not writable.", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Failed to parse json file '{}'{reason}", .path.display())]
    JsonParse {
        path: PathBuf,
        reason: JsonErrorReason,
    },

    #[error("Failed to parse yaml file '{}': {message}", .path.display())]
    YamlParse { path: PathBuf, message: String },

    #[error("Invalid line {line} in env file '{}': expected KEY=value", .path.display())]
    EnvParse { path: PathBuf, line: usize },

    #[error("Compile Error: {message} (File: {})", .file.display())]
    Compile { file: PathBuf, message: String },

    #[error("{0}")]
    SamePath(String),

    #[error(
        "The --save-to directory option is required when rendering all files in a directory."
    )]
    SaveDirectoryRequired,

    #[error("{0}")]
    Aborted(String),

    #[error("{failed} of {total} files failed to render")]
    BatchFailed { failed: usize, total: usize },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StencilError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        StencilError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Human readable reason attached to a failed json parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonErrorReason {
    Depth,
    Syntax,
    ControlCharacter,
    Encoding,
    NotAnObject,
    Unknown,
}

impl fmt::Display for JsonErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JsonErrorReason::Depth => " - Maximum stack depth exceeded",
            JsonErrorReason::Syntax => " - Syntax error, malformed JSON",
            JsonErrorReason::ControlCharacter => " - Unexpected control character found",
            JsonErrorReason::Encoding => {
                " - Malformed UTF-8 characters, possibly incorrectly encoded"
            }
            JsonErrorReason::NotAnObject => " - Top level value must be an object",
            JsonErrorReason::Unknown => " - Unknown error",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_variable_suggests_flag() {
        let err = StencilError::UndefinedVariable {
            name: "favoriteFood".into(),
            flag: "favorite-food".into(),
            file: "example.yaml".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Undefined variable $favoriteFood"), "{msg}");
        assert!(msg.contains("--favorite-food"), "{msg}");
    }

    #[test]
    fn json_reason_is_appended_to_message() {
        let err = StencilError::JsonParse {
            path: PathBuf::from("vars.json"),
            reason: JsonErrorReason::Syntax,
        };
        assert_eq!(
            err.to_string(),
            "Failed to parse json file 'vars.json' - Syntax error, malformed JSON"
        );
    }
}
