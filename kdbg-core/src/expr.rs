//! ターゲット上のグローバル変数をたどる式
//!
//! `dbg_tab[3].d_name`のように、グローバル変数を起点に添字とフィールドを
//! 連ねたアクセスパスだけを扱う。

use crate::Result;
use std::fmt;

/// 式の抽象構文木
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// グローバル変数: `dbg_tab`
    Variable(String),
    /// フィールドアクセス: `obj.field`
    FieldAccess {
        base: Box<Expression>,
        field: String,
    },
    /// 配列インデックスアクセス: `arr[0]`
    IndexAccess {
        base: Box<Expression>,
        index: usize,
    },
}

impl Expression {
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn index(self, index: usize) -> Self {
        Expression::IndexAccess {
            base: Box::new(self),
            index,
        }
    }

    pub fn field(self, field: impl Into<String>) -> Self {
        Expression::FieldAccess {
            base: Box::new(self),
            field: field.into(),
        }
    }

    /// 起点となるグローバル変数名
    pub fn root(&self) -> &str {
        match self {
            Expression::Variable(name) => name,
            Expression::FieldAccess { base, .. } | Expression::IndexAccess { base, .. } => {
                base.root()
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::FieldAccess { base, field } => write!(f, "{}.{}", base, field),
            Expression::IndexAccess { base, index } => write!(f, "{}[{}]", base, index),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn take_ident(input: &str) -> (&str, &str) {
    let end = input.find(|c: char| !is_ident_char(c)).unwrap_or(input.len());
    input.split_at(end)
}

/// 式を左から順にパースする
pub fn parse_expression(input: &str) -> Result<Expression> {
    let input = input.trim();

    let (name, mut rest) = take_ident(input);
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(anyhow::anyhow!("Expected identifier at '{}'", input));
    }
    let mut expr = Expression::variable(name);

    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let (field, tail) = take_ident(after_dot);
            if field.is_empty() {
                return Err(anyhow::anyhow!("Expected field name after '.' in '{}'", input));
            }
            expr = expr.field(field);
            rest = tail;
        } else if let Some(after_bracket) = rest.strip_prefix('[') {
            let close = after_bracket
                .find(']')
                .ok_or_else(|| anyhow::anyhow!("Missing closing bracket ']'"))?;
            let index_str = after_bracket[..close].trim();
            let index = index_str
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("Invalid array index: {}", index_str))?;
            expr = expr.index(index);
            rest = &after_bracket[close + 1..];
        } else {
            return Err(anyhow::anyhow!("Unexpected '{}' in expression '{}'", rest, input));
        }
    }

    Ok(expr)
}
