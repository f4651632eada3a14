use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load runtime settings: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Failed to read trading config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file has missing elements: {}", .missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },

    #[error("Line {line} is not of the form 'key:value': '{content}'")]
    Malformed { line: usize, content: String },

    #[error("Invalid value for '{key}': '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Key '{0}' appears more than once")]
    Duplicate(&'static str),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
