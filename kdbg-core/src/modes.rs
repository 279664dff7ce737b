//! デバッグモードの列挙・検証・切り替え
//!
//! モード表はターゲットプロセスのメモリ上にあり、ターゲット自身や別セッションが
//! いつでも書き換えうる。そのためどの操作も呼び出しごとに表を読み直し、
//! 結果を呼び出しをまたいで保持しない。

use crate::access::{Literal, TargetAccess, Value};
use crate::config::ModeTableLayout;
use crate::errors::TargetError;
use crate::expr::Expression;
use tracing::{debug, warn};

/// 削除を表す接頭辞
pub const REMOVAL_MARKER: char = '-';

/// `dbg`コマンドの使用法
pub const DBG_USAGE: &str = "\
usage: dbg [<modes>]
    <modes>  any number of whitespace separated debug modes
When no arguments are given prints a list of all active debug
modes. If any debug modes are listed they are added to the
current debug modes. If a listed mode is prefixed with a
'-' it is removed instead of added.";

/// モード表の1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeEntry {
    pub name: String,
    pub active: bool,
}

/// 1トークン分の切り替え要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleRequest {
    Add(String),
    Remove(String),
}

impl ToggleRequest {
    /// `-NAME`は削除、それ以外は追加
    pub fn parse(token: &str) -> Self {
        match token.strip_prefix(REMOVAL_MARKER) {
            Some(name) => ToggleRequest::Remove(name.to_string()),
            None => ToggleRequest::Add(token.to_string()),
        }
    }

    /// 接頭辞を除いたモード名
    pub fn name(&self) -> &str {
        match self {
            ToggleRequest::Add(name) | ToggleRequest::Remove(name) => name,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, ToggleRequest::Add(_))
    }

    /// ターゲットに渡す形（元のトークンと同じ）に戻す
    pub fn to_argument(&self) -> String {
        match self {
            ToggleRequest::Add(name) => name.clone(),
            ToggleRequest::Remove(name) => format!("{}{}", REMOVAL_MARKER, name),
        }
    }
}

/// `apply`の結果
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// 存在しないモードに対する警告（トークン順）
    pub warnings: Vec<String>,
    /// ターゲット側で失敗した切り替え
    pub failures: Vec<(String, TargetError)>,
}

/// 存在しないモードに対する警告文
pub fn unknown_mode_warning(name: &str) -> String {
    format!("skipping non-existent mode \"{}\"", name)
}

/// ターゲット上のデバッグモード表
pub struct ModeRegistry<'a, T: TargetAccess + ?Sized> {
    target: &'a T,
    layout: &'a ModeTableLayout,
}

impl<'a, T: TargetAccess + ?Sized> ModeRegistry<'a, T> {
    pub fn new(target: &'a T, layout: &'a ModeTableLayout) -> Self {
        Self { target, layout }
    }

    fn entry_field(&self, index: usize, field: &str) -> Expression {
        Expression::variable(&self.layout.table)
            .index(index)
            .field(field)
    }

    /// モード名を表の順に列挙する
    ///
    /// 名前がNULLまたは空文字列のエントリで止まり、それ以降は読まない。
    /// `max_entries`件の後ろにも番兵がなければ壊れた表として扱う。
    pub fn list_mode_names(&self) -> Result<Vec<String>, TargetError> {
        let mut names = Vec::new();

        for index in 0..=self.layout.max_entries {
            let expr = self.entry_field(index, &self.layout.name_field);
            let name = match self.target.evaluate(&expr)? {
                Value::Null | Value::Integer(0) | Value::Pointer(0) => None,
                Value::String(name) if name.is_empty() => None,
                Value::String(name) => Some(name),
                other => {
                    return Err(TargetError::evaluation(
                        expr,
                        format!("expected a string, got {}", other),
                    ))
                }
            };

            match name {
                None => {
                    debug!("{} has {} modes", self.layout.table, names.len());
                    return Ok(names);
                }
                Some(name) if index < self.layout.max_entries => names.push(name),
                Some(_) => break,
            }
        }

        Err(TargetError::UnterminatedTable {
            table: self.layout.table.clone(),
            limit: self.layout.max_entries,
        })
    }

    /// 有効なモードをターゲットのinfo関数で文字列化する
    ///
    /// 空文字列は「有効なモードなし」を意味する。表示側で置き換えること。
    pub fn report_active_modes(&self) -> Result<String, TargetError> {
        self.target.query_string(&self.layout.active_query, None)
    }

    /// 全モードと有効状態を列挙する
    ///
    /// エントリのビット集合が空でなく、すべて有効マスクに含まれていれば有効とみなす。
    pub fn entries(&self) -> Result<Vec<ModeEntry>, TargetError> {
        let names = self.list_mode_names()?;
        let mask_expr = Expression::variable(&self.layout.active_mask);
        let mask = self.read_word(&mask_expr)?;

        names
            .into_iter()
            .enumerate()
            .map(|(index, name)| -> Result<ModeEntry, TargetError> {
                let bits = self.read_word(&self.entry_field(index, &self.layout.mode_field))?;
                Ok(ModeEntry {
                    name,
                    active: bits != 0 && mask & bits == bits,
                })
            })
            .collect()
    }

    fn read_word(&self, expr: &Expression) -> Result<u64, TargetError> {
        match self.target.evaluate(expr)? {
            Value::Integer(v) => Ok(v),
            other => Err(TargetError::evaluation(
                expr,
                format!("expected an integer, got {}", other),
            )),
        }
    }

    /// トークンごとにモードを追加・削除する
    ///
    /// 表は呼び出しごとに1回だけ読み直す。存在しないモードは警告にして
    /// ターゲットには触れない。あるトークンの失敗は後続のトークンを止めない。
    /// 同じ要求の重複もそのままターゲットに渡す。
    pub fn apply<S: AsRef<str>>(&self, tokens: &[S]) -> Result<ApplyReport, TargetError> {
        let known = self.list_mode_names()?;
        let mut report = ApplyReport::default();

        for token in tokens {
            let request = ToggleRequest::parse(token.as_ref());

            if !known.iter().any(|m| m == request.name()) {
                warn!("skipping unknown mode '{}'", request.name());
                report.warnings.push(unknown_mode_warning(request.name()));
                continue;
            }

            let argument = Literal::Str(request.to_argument());
            debug!("{}({})", self.layout.mutator, argument);
            if let Err(e) = self.target.call_function(&self.layout.mutator, &argument) {
                warn!("failed to toggle mode '{}': {}", request.name(), e);
                report.failures.push((request.to_argument(), e));
            }
        }

        Ok(report)
    }

    /// 入力途中の`dbg`コマンドに対する補完候補
    ///
    /// `prefix`で始まり、同じ行にまだ書かれていない（`-`の有無は問わない）
    /// モード名を昇順で返す。
    pub fn complete<S: AsRef<str>>(
        &self,
        already_typed: &[S],
        prefix: &str,
    ) -> Result<Vec<String>, TargetError> {
        let mut candidates: Vec<String> = self
            .list_mode_names()?
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .filter(|name| {
                !already_typed
                    .iter()
                    .any(|used| ToggleRequest::parse(used.as_ref()).name() == name)
            })
            .collect();
        candidates.sort();
        Ok(candidates)
    }
}
