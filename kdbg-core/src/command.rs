//! デバッガコマンド

use crate::errors::CommandError;
use crate::parse::split_shell_words;

/// REPLのコマンド名（補完用）
pub const COMMAND_NAMES: &[&str] = &[
    "break", "continue", "dbg", "help", "info", "modes", "quit",
];

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// info関数を呼び出す（引数の数はInfoQuery側で検証する）
    Info(Vec<String>),
    /// 有効なモードの表示、またはモードの切り替え
    Dbg(Vec<String>),
    /// 全モードの一覧
    Modes,
    /// ブレークポイントを設定
    Break(String),
    /// 実行継続
    Continue,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
    /// 未知のコマンド
    Unknown(String),
}

impl Command {
    /// コマンドラインをパースする。空行はNone
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let words = split_shell_words(line).map_err(|e| CommandError::Parse(e.to_string()))?;
        Ok(Self::from_words(words))
    }

    /// 分割済みの単語列から作成する
    pub fn from_words(mut words: Vec<String>) -> Option<Self> {
        if words.is_empty() {
            return None;
        }
        let name = words.remove(0);

        let command = match name.as_str() {
            "info" | "i" => Command::Info(words),
            "dbg" => Command::Dbg(words),
            "modes" => Command::Modes,
            "break" | "b" if !words.is_empty() => Command::Break(words.join(" ")),
            "continue" | "c" => Command::Continue,
            "help" | "h" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            _ => Command::Unknown(name),
        };
        Some(command)
    }

    /// ターゲットの状態を読む・変更するコマンドかどうか
    pub fn touches_target(&self) -> bool {
        matches!(self, Command::Info(_) | Command::Dbg(_) | Command::Modes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<Command> {
        Command::parse(line).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("continue"), Some(Command::Continue));
        assert_eq!(parse("c"), Some(Command::Continue));
        assert_eq!(parse("modes"), Some(Command::Modes));
        assert_eq!(parse("quit"), Some(Command::Quit));
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn test_parse_target_commands_keep_raw_args() {
        assert_eq!(
            parse("info proc_info \"curproc\""),
            Some(Command::Info(vec!["proc_info".into(), "curproc".into()]))
        );
        // 引数の数の検証はここでは行わない
        assert_eq!(parse("info"), Some(Command::Info(vec![])));
        assert_eq!(
            parse("dbg KTRACE -PROC"),
            Some(Command::Dbg(vec!["KTRACE".into(), "-PROC".into()]))
        );
        assert_eq!(parse("dbg"), Some(Command::Dbg(vec![])));
    }

    #[test]
    fn test_parse_break_requires_location() {
        assert_eq!(parse("break main"), Some(Command::Break("main".into())));
        assert_eq!(parse("break"), Some(Command::Unknown("break".into())));
    }

    #[test]
    fn test_parse_unterminated_quote() {
        assert!(matches!(
            Command::parse("info \"x"),
            Err(CommandError::Parse(_))
        ));
    }
}
