//! テスト用のターゲットスタブ
//!
//! モード表とinfo関数をメモリ上に持ち、呼び出しをすべて記録する。

#![allow(dead_code)]

use kdbg_core::{Expression, Literal, TargetAccess, TargetError, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub const ADD_MODE: &str = "dbg_add_mode";
pub const ACTIVE_QUERY: &str = "dbg_modes_info";

pub struct StubTarget {
    /// モード名の列（Noneは名前がNULLのエントリ）
    pub table: RefCell<Vec<Option<String>>>,
    pub mode_bits: RefCell<Vec<u64>>,
    pub active_mask: Cell<u64>,
    pub active_report: RefCell<String>,
    pub info_functions: HashMap<String, String>,
    /// 表の末尾を越えて読むと合成した名前を返す（番兵のない壊れた表）
    pub unterminated: bool,
    /// この引数での呼び出しは失敗させる
    pub failing_arguments: Vec<String>,
    pub evaluations: RefCell<Vec<String>>,
    pub calls: RefCell<Vec<(String, Literal)>>,
    pub queries: RefCell<Vec<(String, Option<String>)>>,
}

impl StubTarget {
    /// 各エントリを空文字列ならNULLではなく空文字列として持つ
    pub fn with_modes(names: &[&str]) -> Self {
        let table: Vec<Option<String>> = names.iter().map(|n| Some(n.to_string())).collect();
        let bits = (0..table.len()).map(|i| 1u64 << i).collect();
        Self {
            table: RefCell::new(table),
            mode_bits: RefCell::new(bits),
            active_mask: Cell::new(0),
            active_report: RefCell::new(String::new()),
            info_functions: HashMap::new(),
            unterminated: false,
            failing_arguments: Vec::new(),
            evaluations: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            queries: RefCell::new(Vec::new()),
        }
    }

    /// `["KTRACE", "PROC", "-", ""]`
    pub fn kernel_table() -> Self {
        Self::with_modes(&["KTRACE", "PROC", "-", ""])
    }

    pub fn with_info(mut self, function: &str, output: &str) -> Self {
        self.info_functions
            .insert(function.to_string(), output.to_string());
        self
    }

    pub fn call_arguments(&self) -> Vec<Literal> {
        self.calls.borrow().iter().map(|(_, arg)| arg.clone()).collect()
    }

    fn table_field(&self, index: usize, field: &str) -> Result<Value, TargetError> {
        let table = self.table.borrow();
        match field {
            "d_name" => match table.get(index) {
                Some(Some(name)) => Ok(Value::String(name.clone())),
                Some(None) => Ok(Value::Null),
                None if self.unterminated => Ok(Value::String(format!("GARBAGE{}", index))),
                None => Err(TargetError::Evaluation {
                    expression: format!("dbg_tab[{}].d_name", index),
                    reason: "read past the end of the table".to_string(),
                }),
            },
            "d_mode" => self
                .mode_bits
                .borrow()
                .get(index)
                .map(|bits| Value::Integer(*bits))
                .ok_or_else(|| TargetError::Evaluation {
                    expression: format!("dbg_tab[{}].d_mode", index),
                    reason: "no such entry".to_string(),
                }),
            other => Err(TargetError::Evaluation {
                expression: format!("dbg_tab[{}].{}", index, other),
                reason: "no such field".to_string(),
            }),
        }
    }
}

impl TargetAccess for StubTarget {
    fn evaluate(&self, expr: &Expression) -> Result<Value, TargetError> {
        self.evaluations.borrow_mut().push(expr.to_string());

        if let Expression::FieldAccess { base, field } = expr {
            if let Expression::IndexAccess { base, index } = base.as_ref() {
                if **base == Expression::variable("dbg_tab") {
                    return self.table_field(*index, field);
                }
            }
        }
        if *expr == Expression::variable("dbg_modes") {
            return Ok(Value::Integer(self.active_mask.get()));
        }

        Err(TargetError::SymbolNotFound(expr.root().to_string()))
    }

    fn call_function(&self, name: &str, argument: &Literal) -> Result<(), TargetError> {
        self.calls
            .borrow_mut()
            .push((name.to_string(), argument.clone()));

        if let Literal::Str(text) = argument {
            if self.failing_arguments.iter().any(|f| f == text) {
                return Err(TargetError::CallFailed {
                    function: name.to_string(),
                    reason: "target crashed".to_string(),
                });
            }
        }
        Ok(())
    }

    fn query_string(&self, function: &str, argument: Option<&str>) -> Result<String, TargetError> {
        self.queries
            .borrow_mut()
            .push((function.to_string(), argument.map(str::to_string)));

        if function == ACTIVE_QUERY {
            return Ok(self.active_report.borrow().clone());
        }
        match self.info_functions.get(function) {
            Some(output) => Ok(format!("{}{}", output, argument.unwrap_or(""))),
            None => Err(TargetError::SymbolNotFound(function.to_string())),
        }
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
