//! Error types for the gateway, configuration, persistence, and planner seams.

use std::io;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("client build failed: {message}")]
    BuildClient { message: String },
    #[error("http request failed: {message}")]
    Http { message: String },
    #[error("request to {path} timed out")]
    Timeout { path: String },
    #[error("http status {code}: {message}")]
    HttpStatus { code: u16, message: String },
    #[error("decode response failed: {message}")]
    DecodeResponse { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing env variable: {key}")]
    MissingEnv { key: &'static str },
    #[error("empty env variable: {key}")]
    EmptyEnv { key: &'static str },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("read config file failed ({path}): {message}")]
    ReadConfigFile { path: String, message: String },
    #[error("parse config file failed ({path}): {message}")]
    ParseConfigFile { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serde error: {0}")]
    Serde(String),
}

impl From<io::Error> for PersistError {
    fn from(err: io::Error) -> Self {
        PersistError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::Serde(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("client build failed: {message}")]
    BuildClient { message: String },
    #[error("http request failed: {message}")]
    Http { message: String },
    #[error("http status {code}: {message}")]
    HttpStatus { code: u16, message: String },
    #[error("decode response failed: {message}")]
    DecodeResponse { message: String },
}

/// Reasons a planner-authored chain definition is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainDefinitionError {
    #[error("chain name must be snake_case: {name}")]
    InvalidName { name: String },
    #[error("chain name clashes with a built-in chain: {name}")]
    BuiltinClash { name: String },
    #[error("chain must have between 1 and {max} steps, got {count}")]
    StepCount { count: usize, max: usize },
    #[error("step {index}: search steps need a search_target")]
    MissingSearchTarget { index: usize },
    #[error("step {index}: {kind} steps need skip_if")]
    MissingSkipIf { index: usize, kind: String },
    #[error("chain crafts items but never gathers materials")]
    NoGatherStep,
    #[error("chain definition could not be stored: {0}")]
    Persist(#[from] PersistError),
}
