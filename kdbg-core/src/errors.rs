//! エラー型

use thiserror::Error;

/// プロセスに接続されていない場合のエラーメッセージ
pub const ERR_NOT_ATTACHED: &str = "Not attached to a process";

/// ターゲットアクセスのエラー
///
/// 評価や関数呼び出しの失敗。発生したコマンドだけを中断し、セッションは継続する。
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("{}", ERR_NOT_ATTACHED)]
    NotAttached,

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Cannot evaluate '{expression}': {reason}")]
    Evaluation { expression: String, reason: String },

    #[error("Table '{table}' has no terminating entry within {limit} entries")]
    UnterminatedTable { table: String, limit: usize },

    #[error("Call to '{function}' failed: {reason}")]
    CallFailed { function: String, reason: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl TargetError {
    pub(crate) fn evaluation(expression: impl ToString, reason: impl ToString) -> Self {
        TargetError::Evaluation {
            expression: expression.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn call_failed(function: &str, reason: impl ToString) -> Self {
        TargetError::CallFailed {
            function: function.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// コマンド単位のエラー
#[derive(Error, Debug)]
pub enum CommandError {
    /// 引数の数が不正（使用法はすでに出力済み）
    #[error("{0}")]
    Usage(&'static str),

    /// コマンドラインの字句解析に失敗
    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Target(#[from] TargetError),

    /// 一部のモード切り替えがターゲット側で失敗した
    #[error("{failed} mode change(s) failed")]
    Toggle { failed: usize },

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
}
