//! kdbg DWARF デバッグ情報解析
//!
//! このクレートは、ELFファイルとDWARFデバッグ情報の解析機能を提供します。
//! シンボルテーブルからのアドレス解決と、グローバル変数の型（構造体レイアウト、
//! 配列長、ポインタの参照先）の抽出を行います。

pub mod loader;
pub mod symbols;
pub mod type_info;
pub mod globals;

pub use loader::{DwarfLoader, DwarfReader};
pub use symbols::{Symbol, SymbolResolver};
pub use type_info::{FieldInfo, TypeInfo, TypeInfoExtractor};
pub use globals::GlobalTypeResolver;

/// DWARF解析の結果型
pub type Result<T> = anyhow::Result<T>;
