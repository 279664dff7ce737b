//! REPLの補完
//!
//! 候補は毎回ターゲットから取り直す。モード表はセッション中に変わりうるため。

use kdbg_core::command::COMMAND_NAMES;
use kdbg_core::{Debugger, ModeRegistry, ModeTableLayout};
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// カーソル位置の単語が何を補完すべきか
#[derive(Debug, PartialEq, Eq)]
pub enum CompletionContext<'a> {
    /// 行頭の単語
    Command,
    /// `dbg`の引数。補完中の単語以外に書かれているトークンを持つ
    ModeName { already_typed: Vec<&'a str> },
    /// `info`の第1引数
    InfoFunction,
    /// 補完しない
    Nothing,
}

/// 補完中の単語の開始位置・単語・文脈を求める
pub fn completion_context(line: &str, pos: usize) -> (usize, &str, CompletionContext<'_>) {
    // 全角空白など複数バイトの空白もある
    let start = line[..pos]
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let word = &line[start..pos];
    let before: Vec<&str> = line[..start].split_whitespace().collect();

    let context = match before.as_slice() {
        [] => CompletionContext::Command,
        ["dbg", ..] => {
            let after = line[pos..].split_whitespace().skip(usize::from(
                line[pos..].starts_with(|c: char| !c.is_whitespace()),
            ));
            let already_typed = before[1..].iter().copied().chain(after).collect();
            CompletionContext::ModeName { already_typed }
        }
        ["info" | "i"] => CompletionContext::InfoFunction,
        _ => CompletionContext::Nothing,
    };
    (start, word, context)
}

fn pairs(items: impl IntoIterator<Item = String>) -> Vec<Pair> {
    items
        .into_iter()
        .map(|item| Pair {
            display: item.clone(),
            replacement: item,
        })
        .collect()
}

/// rustyline用ヘルパー
pub struct KdbgHelper {
    debugger: Rc<RefCell<Debugger>>,
    layout: ModeTableLayout,
}

impl KdbgHelper {
    pub fn new(debugger: Rc<RefCell<Debugger>>, layout: ModeTableLayout) -> Self {
        Self { debugger, layout }
    }

    fn candidates(&self, word: &str, context: &CompletionContext<'_>) -> Vec<String> {
        match context {
            CompletionContext::Command => COMMAND_NAMES
                .iter()
                .filter(|name| name.starts_with(word))
                .map(|name| name.to_string())
                .collect(),
            CompletionContext::ModeName { already_typed } => {
                let Ok(debugger) = self.debugger.try_borrow() else {
                    return Vec::new();
                };
                ModeRegistry::new(&*debugger, &self.layout)
                    .complete(already_typed.as_slice(), word)
                    .unwrap_or_else(|e| {
                        debug!("mode completion failed: {}", e);
                        Vec::new()
                    })
            }
            CompletionContext::InfoFunction => match self.debugger.try_borrow() {
                Ok(debugger) => debugger.function_names_with_prefix(word),
                Err(_) => Vec::new(),
            },
            CompletionContext::Nothing => Vec::new(),
        }
    }
}

impl Helper for KdbgHelper {}

impl Highlighter for KdbgHelper {}

impl Hinter for KdbgHelper {
    type Hint = String;
}

impl Validator for KdbgHelper {}

impl Completer for KdbgHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, word, context) = completion_context(line, pos);
        Ok((start, pairs(self.candidates(word, &context))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_word_completes_commands() {
        assert_eq!(completion_context("", 0), (0, "", CompletionContext::Command));
        assert_eq!(
            completion_context("db", 2),
            (0, "db", CompletionContext::Command)
        );
    }

    #[test]
    fn test_dbg_arguments_complete_modes() {
        let (start, word, context) = completion_context("dbg KTRACE -P", 13);
        assert_eq!(start, 11);
        assert_eq!(word, "-P");
        assert_eq!(
            context,
            CompletionContext::ModeName {
                already_typed: vec!["KTRACE"]
            }
        );
    }

    #[test]
    fn test_dbg_words_after_cursor_count_as_typed() {
        // カーソルは"dbg "の直後、単語の途中ではない
        let (_, word, context) = completion_context("dbg  PROC", 4);
        assert_eq!(word, "");
        assert_eq!(
            context,
            CompletionContext::ModeName {
                already_typed: vec!["PROC"]
            }
        );

        // 単語の途中なら、その残りは除外しない
        let (_, word, context) = completion_context("dbg KTR PROC", 7);
        assert_eq!(word, "KTR");
        assert_eq!(
            context,
            CompletionContext::ModeName {
                already_typed: vec!["PROC"]
            }
        );
    }

    #[test]
    fn test_multibyte_whitespace_separates_words() {
        let line = "dbg\u{3000}K";
        let (start, word, context) = completion_context(line, line.len());
        assert_eq!(start, 6);
        assert_eq!(word, "K");
        assert_eq!(
            context,
            CompletionContext::ModeName {
                already_typed: vec![]
            }
        );

        let line = "info\u{a0}proc";
        let (_, word, context) = completion_context(line, line.len());
        assert_eq!(word, "proc");
        assert_eq!(context, CompletionContext::InfoFunction);
    }

    #[test]
    fn test_info_completes_first_argument_only() {
        assert_eq!(
            completion_context("info proc_", 10),
            (5, "proc_", CompletionContext::InfoFunction)
        );
        assert_eq!(
            completion_context("i proc_", 7).2,
            CompletionContext::InfoFunction
        );
        assert_eq!(
            completion_context("info proc_info cur", 18).2,
            CompletionContext::Nothing
        );
    }

    #[test]
    fn test_other_commands_complete_nothing() {
        assert_eq!(
            completion_context("break ma", 8).2,
            CompletionContext::Nothing
        );
    }

    #[test]
    fn test_pairs_keep_candidate_text() {
        let result = pairs(vec!["KTRACE".to_string()]);
        assert_eq!(result[0].display, "KTRACE");
        assert_eq!(result[0].replacement, "KTRACE");
    }
}
