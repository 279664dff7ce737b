//! INT3の書き込みと復元
//!
//! ユーザーのブレークポイントと、関数呼び出しの戻りトラップの両方で使う。

use crate::{Memory, Result};

/// INT3命令のオペコード
pub const INT3_OPCODE: u8 = 0xCC;

/// 1バイトをINT3に差し替えるパッチ
#[derive(Debug)]
pub struct SoftwareBreakpoint {
    address: u64,
    original_byte: Option<u8>,
}

impl SoftwareBreakpoint {
    /// まだメモリには書き込まない
    pub fn new(address: u64) -> Self {
        Self {
            address,
            original_byte: None,
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn is_enabled(&self) -> bool {
        self.original_byte.is_some()
    }

    /// このINT3を実行して停止したときのPCか
    ///
    /// SIGTRAP時のRIPはINT3の次の命令を指す。
    pub fn trapped_at(&self, pc: u64) -> bool {
        pc == self.address.wrapping_add(1)
    }

    pub fn enable(&mut self, memory: &Memory) -> Result<()> {
        if self.is_enabled() {
            return Ok(());
        }

        let original = memory.read_u8(self.address as usize)?;
        memory.write_u8(self.address as usize, INT3_OPCODE)?;
        self.original_byte = Some(original);
        Ok(())
    }

    /// 元のバイトを書き戻す
    pub fn disable(&mut self, memory: &Memory) -> Result<()> {
        if let Some(original) = self.original_byte {
            memory.write_u8(self.address as usize, original)?;
            self.original_byte = None;
        }
        Ok(())
    }
}
