use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanetError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Cache key errors
    #[error("Identifier produces an empty cache key: {0:?}")]
    EmptyCacheKey(String),

    // Network errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // Parsing errors
    #[error("Feed parsing failed: {0}")]
    FeedParse(String),

    #[error("Cached entry is unreadable: {0}")]
    Serialization(#[from] serde_json::Error),

    // Storage errors
    #[error("Index database error: {0}")]
    Database(#[from] rusqlite::Error),

    // Filter errors
    #[error("Filter '{name}' failed: {reason}")]
    Filter { name: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // User input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type PlanetResult<T> = Result<T, PlanetError>;
