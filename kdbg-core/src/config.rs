//! ターゲット側のシンボル配置と呼び出し設定

/// デバッグモード表のレイアウト
///
/// ターゲットは`<table>[i].<name_field>`がNULL（または空文字列）になるまで
/// モードを並べた表を持つ。各シンボル名はCLIから上書きできる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTableLayout {
    /// モード表のグローバル変数名
    pub table: String,
    /// 各エントリのモード名フィールド
    pub name_field: String,
    /// 各エントリのビット集合フィールド
    pub mode_field: String,
    /// 有効なモードのビットマスクを持つグローバル変数
    pub active_mask: String,
    /// 有効なモードを文字列で返すinfo関数
    pub active_query: String,
    /// モードを追加・削除する関数（`-`付きの名前で削除）
    pub mutator: String,
    /// 番兵が見つからない場合に読むエントリ数の上限
    pub max_entries: usize,
}

impl Default for ModeTableLayout {
    fn default() -> Self {
        Self {
            table: "dbg_tab".to_string(),
            name_field: "d_name".to_string(),
            mode_field: "d_mode".to_string(),
            active_mask: "dbg_modes".to_string(),
            active_query: "dbg_modes_info".to_string(),
            mutator: "dbg_add_mode".to_string(),
            max_entries: 256,
        }
    }
}

/// ターゲット内関数呼び出しの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallConfig {
    /// info関数に渡す出力バッファのサイズ
    pub info_buffer_size: usize,
    /// `char *`を読むときの最大長
    pub max_string_len: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            info_buffer_size: 32 * 1024,
            max_string_len: 4096,
        }
    }
}
