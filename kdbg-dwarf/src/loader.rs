//! ELFとDWARFの読み込み機能

use crate::Result;
use object::{Object, ObjectSection};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// 読み込んだDWARFセクションのリーダー型
pub type DwarfReader = gimli::EndianSlice<'static, gimli::RunTimeEndian>;

/// DWARFローダー
pub struct DwarfLoader {
    object_file: object::File<'static>,
    dwarf: gimli::Dwarf<DwarfReader>,
}

impl DwarfLoader {
    /// ELFファイルからDWARF情報を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_data = fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read file {:?}: {}", path, e))?;

        // セッション中はずっと参照するため'staticにする
        let file_data: &'static [u8] = Box::leak(file_data.into_boxed_slice());

        let object_file = object::File::parse(file_data)
            .map_err(|e| anyhow::anyhow!("Failed to parse ELF file {:?}: {}", path, e))?;

        let endian = if object_file.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        let load_section = |id: gimli::SectionId| -> Result<DwarfReader> {
            let data = object_file
                .section_by_name(id.name())
                .and_then(|section| section.data().ok())
                .unwrap_or(&[]);
            Ok(gimli::EndianSlice::new(data, endian))
        };

        let dwarf = gimli::Dwarf::load(load_section)
            .map_err(|e| anyhow::anyhow!("Failed to load DWARF sections: {}", e))?;

        let loader = Self { object_file, dwarf };
        if !loader.has_debug_info() {
            // シンボル経由の関数呼び出しはできるが、グローバル変数の型がわからない
            warn!("{:?} has no .debug_info; global variables cannot be evaluated", path);
        }
        debug!(
            "loaded {:?} (pie: {}, entry: 0x{:x})",
            path,
            loader.is_pie(),
            loader.entry_point()
        );
        Ok(loader)
    }

    /// DWARFコンテキストへの参照を取得
    pub fn dwarf(&self) -> &gimli::Dwarf<DwarfReader> {
        &self.dwarf
    }

    /// オブジェクトファイルへの参照を取得
    pub fn object_file(&self) -> &object::File<'static> {
        &self.object_file
    }

    /// ELFヘッダのエントリポイント（ロードバイアス適用前）
    pub fn entry_point(&self) -> u64 {
        self.object_file.entry()
    }

    /// PIE（ET_DYN）かどうか
    ///
    /// PIEの場合、シンボルアドレスに実行時のロードベースを加算する必要がある。
    pub fn is_pie(&self) -> bool {
        matches!(self.object_file.kind(), object::ObjectKind::Dynamic)
    }

    /// `.debug_info`セクションを持つか
    pub fn has_debug_info(&self) -> bool {
        self.object_file
            .section_by_name(".debug_info")
            .is_some_and(|section| section.size() > 0)
    }
}
