use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridRankError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine '{engine_id}' is {status}")]
    EngineUnavailable { engine_id: String, status: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
