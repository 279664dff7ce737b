//! kdbg ターゲットプロセス制御
//!
//! このクレートは、検査対象のプロセスを制御するための低レベル機能を提供します。
//! ptraceによるアタッチと実行制御、/proc/pid/mem経由のメモリアクセス、
//! レジスタアクセス、INT3ブレークポイント、ターゲット内での関数呼び出しを行います。

pub mod process;
pub mod memory;
pub mod registers;
pub mod breakpoint;
pub mod call;

pub use process::{Process, StopReason};
pub use memory::Memory;
pub use registers::Registers;
pub use breakpoint::SoftwareBreakpoint;
pub use call::{CallArg, CallResult, FunctionCall};

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
