use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cluster id must not be empty")]
    MissingCluster,

    #[error("stream task stopped")]
    Stopped,

    #[error("stream task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
