//! セッション制御用のブレークポイント
//!
//! 検査コマンドは停止中のターゲットに対してしか呼べないので、
//! 目的の場所でターゲットを止めておくために使う。

use crate::Result;
use kdbg_target::{Memory, SoftwareBreakpoint};
use std::collections::BTreeMap;

/// ブレークポイントID
pub type BreakpointId = usize;

/// アドレスごとのブレークポイント
pub struct BreakpointManager {
    by_address: BTreeMap<u64, (BreakpointId, SoftwareBreakpoint)>,
    next_id: BreakpointId,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self {
            by_address: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// INT3を書き込んで登録する。同じアドレスに既にあればそのIDを返す
    pub fn insert(&mut self, address: u64, memory: &Memory) -> Result<BreakpointId> {
        if let Some((id, _)) = self.by_address.get(&address) {
            return Ok(*id);
        }

        let mut patch = SoftwareBreakpoint::new(address);
        patch.enable(memory)?;

        let id = self.next_id;
        self.next_id += 1;
        self.by_address.insert(address, (id, patch));
        Ok(id)
    }

    /// SIGTRAP時のPCから、当たったブレークポイントのアドレスを求める
    pub fn hit_by(&self, pc: u64) -> Option<u64> {
        self.by_address
            .values()
            .find(|(_, patch)| patch.trapped_at(pc))
            .map(|(_, patch)| patch.address())
    }

    /// 指定アドレスのINT3を一時的に外す（ステップオーバー用）
    pub fn suspend_at(&mut self, address: u64, memory: &Memory) -> Result<bool> {
        match self.by_address.get_mut(&address) {
            Some((_, patch)) if patch.is_enabled() => {
                patch.disable(memory)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// `suspend_at`で外したINT3を戻す
    pub fn resume_at(&mut self, address: u64, memory: &Memory) -> Result<()> {
        if let Some((_, patch)) = self.by_address.get_mut(&address) {
            patch.enable(memory)?;
        }
        Ok(())
    }
}

impl Default for BreakpointManager {
    fn default() -> Self {
        Self::new()
    }
}
