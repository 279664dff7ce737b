//! kdbg のコア機能
//!
//! 稼働中のカーネル風プロセスを対話的に検査するためのコマンド層です。
//! ターゲット内のinfo関数の呼び出しと、デバッグモード表の列挙・検証・切り替え・補完を
//! [`TargetAccess`]トレイト越しに行います。ptraceによる実装は[`Debugger`]です。

pub mod access;
pub mod breakpoint;
pub mod command;
pub mod config;
pub mod debugger;
pub mod errors;
pub mod expr;
pub mod info;
pub mod modes;
pub mod parse;
pub mod shell;

pub use access::{Literal, TargetAccess, Value};
pub use breakpoint::BreakpointId;
pub use command::Command;
pub use config::{CallConfig, ModeTableLayout};
pub use debugger::Debugger;
pub use errors::{CommandError, TargetError};
pub use expr::Expression;
pub use info::{InfoQuery, QueryInvocation};
pub use modes::{ApplyReport, ModeEntry, ModeRegistry, ToggleRequest};

// 他のクレートから使用するために再エクスポート
pub use kdbg_dwarf::Symbol;
pub use kdbg_target::StopReason;

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
