use thiserror::Error;

/// 自己対局レイヤーのエラー
#[derive(Error, Debug)]
pub enum SelfPlayError {
    #[error("invalid position: {0}")]
    InvalidFen(String),

    #[error("invalid move notation: {0}")]
    InvalidMove(String),

    #[error("illegal move {mv} in position {fen}")]
    IllegalMove { mv: String, fen: String },

    #[error("option {name} out of range: {value} (allowed {min}..={max})")]
    OptionOutOfRange {
        name: &'static str,
        value: String,
        min: String,
        max: String,
    },

    #[error("failed to parse option {name}: {value}")]
    InvalidOptionValue { name: String, value: String },

    /// 投了判定は両プレイヤーで同じ方式を前提とする
    #[error("both players must use the same resign style")]
    MixedResignStyle,

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network computation failed: {0:#}")]
    Network(#[source] anyhow::Error),

    #[error("search engine failed: {0:#}")]
    Engine(#[source] anyhow::Error),

    #[error("training data writer failed: {0:#}")]
    Writer(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SelfPlayError>;
