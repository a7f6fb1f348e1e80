use cf_core::CoreError;
use cf_exec::ExecError;
use cf_graph::GraphError;

pub type CliResult<T> = Result<T, CliError>;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Invalid config: {what}")]
    Config { what: String },

    #[error("Demo produced no value for {what}")]
    MissingValue { what: &'static str },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Numeric error: {0}")]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
