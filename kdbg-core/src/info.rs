//! info関数の呼び出し

use crate::access::TargetAccess;
use crate::errors::{CommandError, TargetError};
use tracing::debug;

/// `info`コマンドの使用法
pub const INFO_USAGE: &str = "\
usage: info <infofunc> [<data>]
    <infofunc> the info function to be called
    <data>     the first argument to <infofunc>, if unspecified NULL is used
Prints the string generated by one of the kernel's info functions.";

/// 1回分のinfo呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInvocation {
    pub function_name: String,
    pub argument: Option<String>,
}

impl QueryInvocation {
    /// コマンド引数（1個または2個）から作成する
    pub fn from_tokens(tokens: &[String]) -> Result<Self, CommandError> {
        match tokens {
            [function] | [function, _] if function.is_empty() => {
                Err(CommandError::Usage("empty info function name"))
            }
            [function] => Ok(Self {
                function_name: function.clone(),
                argument: None,
            }),
            [function, argument] => Ok(Self {
                function_name: function.clone(),
                argument: Some(argument.clone()),
            }),
            _ => Err(CommandError::Usage("invalid arguments")),
        }
    }
}

/// info関数の呼び出し器
pub struct InfoQuery<'a, T: TargetAccess + ?Sized> {
    target: &'a T,
}

impl<'a, T: TargetAccess + ?Sized> InfoQuery<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }

    /// info関数を評価し、ターゲットが生成した文字列をそのまま返す
    pub fn execute(&self, invocation: &QueryInvocation) -> Result<String, TargetError> {
        debug!(
            "info query {}({})",
            invocation.function_name,
            invocation.argument.as_deref().unwrap_or("NULL")
        );
        self.target
            .query_string(&invocation.function_name, invocation.argument.as_deref())
    }
}
