use thiserror::Error;

/// Reasons a model's declared tensors cannot be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("model declares no {0} tensor at index {1}")]
    MissingTensor(&'static str, usize),

    #[error("input or output tensor rank < 3 (input = {input}, output = {output})")]
    RankTooSmall { input: usize, output: usize },

    #[error("{kind} tensor {index} ({name}) still has a symbolic dimension: {dims:?}")]
    Symbolic {
        kind: &'static str,
        index: usize,
        name: String,
        dims: Vec<i64>,
    },
}

/// Failures reported by the inference runtime itself.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("runtime backend error: {0}")]
    Backend(String),

    #[error("output {name} produced {actual} values, buffer holds {expected}")]
    OutputSize {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("runtime has no output named {0}")]
    UnknownOutput(String),
}

impl From<ort::Error> for RuntimeError {
    fn from(err: ort::Error) -> Self {
        RuntimeError::Backend(err.to_string())
    }
}

/// Session creation failures. Each variant carries a stable numeric code so a
/// host can decide between disabling the feature and retrying.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("model object is not set (selection {0:?})")]
    ModelNotSet(String),

    #[error("unable to resolve model asset {0}")]
    AssetNotFound(String),

    #[error("invalid model input/output shape: {0}")]
    InvalidShape(#[from] ShapeError),

    #[error("inference session startup failed: {0}")]
    Startup(String),
}

impl SessionError {
    pub const SUCCESS: i32 = 0;

    pub fn code(&self) -> i32 {
        match self {
            SessionError::AssetNotFound(_) => 1,
            SessionError::ModelNotSet(_) => 2,
            SessionError::InvalidShape(_) => 3,
            SessionError::Startup(_) => 5,
        }
    }
}

/// A failure inside a single tick. Always caught at the tick boundary.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("tensor layout mismatch: {0}")]
    Layout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_codes_are_distinct() {
        let codes = [
            SessionError::AssetNotFound("a".into()).code(),
            SessionError::ModelNotSet("b".into()).code(),
            SessionError::InvalidShape(ShapeError::RankTooSmall { input: 2, output: 4 }).code(),
            SessionError::Startup("c".into()).code(),
        ];
        assert_eq!(codes, [1, 2, 3, 5]);
        assert!(!codes.contains(&SessionError::SUCCESS));
    }
}
