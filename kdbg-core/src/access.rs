//! ターゲットアクセスの抽象
//!
//! InfoQueryとModeRegistryは、検査対象プロセスにこのトレイト経由でのみ触れる。
//! 実装はptraceセッション（[`crate::Debugger`]）でも、テスト用のスタブでもよい。
//! どの呼び出しも同期的な往復で、実装側はターゲットの状態をキャッシュしてはならない。

use crate::errors::TargetError;
use crate::expr::Expression;
use std::fmt;

/// 式の評価結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// NULLポインタ
    Null,
    /// 整数値（ゼロ拡張）
    Integer(u64),
    /// 文字列以外を指すポインタ
    Pointer(u64),
    /// `char *`が指していたNUL終端文字列
    String(String),
    /// 構造体や配列など、値として読めないもの（先頭アドレスを返す）
    Composite { address: u64, type_name: String },
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Pointer(v) => write!(f, "0x{:x}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Composite { address, type_name } => write!(f, "({}) 0x{:x}", type_name, address),
        }
    }
}

/// ターゲット内の関数に渡すリテラル引数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Null,
    Integer(u64),
    /// C文字列リテラル。ターゲット側にNUL終端で書き込んでポインタを渡す
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Integer(v) => write!(f, "{}", v),
            Literal::Str(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        _ => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
        }
    }
}

/// 検査対象プロセスへのアクセス
pub trait TargetAccess {
    /// ターゲットのアドレス空間で式を評価する
    fn evaluate(&self, expr: &Expression) -> Result<Value, TargetError>;

    /// ターゲット内の関数を呼び出す（戻り値は使わない）
    fn call_function(&self, name: &str, argument: &Literal) -> Result<(), TargetError>;

    /// info関数を呼び出し、生成された文字列を返す
    ///
    /// `argument`は解釈せずそのまま渡す。Noneの場合はNULLを渡す。
    fn query_string(&self, function: &str, argument: Option<&str>) -> Result<String, TargetError>;
}
