//! レジスタアクセスと呼び出しフレームの組み立て

use crate::Result;
use nix::libc::user_regs_struct;
use nix::unistd::Pid;

/// レジスタで渡せる引数の最大数（rdi, rsi, rdx, rcx, r8, r9）
pub const MAX_REGISTER_ARGS: usize = 6;

/// レジスタアクセス
pub struct Registers {
    pid: Pid,
}

impl Registers {
    pub fn new(pid: i32) -> Self {
        Self {
            pid: Pid::from_raw(pid),
        }
    }

    /// 全汎用レジスタを読み取る
    pub fn read(&self) -> Result<user_regs_struct> {
        Ok(nix::sys::ptrace::getregs(self.pid)?)
    }

    /// 全汎用レジスタを書き込む
    pub fn write(&self, regs: user_regs_struct) -> Result<()> {
        nix::sys::ptrace::setregs(self.pid, regs)?;
        Ok(())
    }

    pub fn get_pc(&self) -> Result<u64> {
        Ok(self.read()?.rip)
    }

    pub fn set_pc(&self, pc: u64) -> Result<()> {
        let mut regs = self.read()?;
        regs.rip = pc;
        self.write(regs)
    }
}

/// `slot`番目の整数引数をSystem V ABIのレジスタに置く
pub fn set_argument(regs: &mut user_regs_struct, slot: usize, value: u64) {
    match slot {
        0 => regs.rdi = value,
        1 => regs.rsi = value,
        2 => regs.rdx = value,
        3 => regs.rcx = value,
        4 => regs.r8 = value,
        _ => regs.r9 = value,
    }
}

/// 保存済みレジスタから、`function`の入口に飛ぶレジスタ集合を作る
///
/// `sp`には戻りアドレスを積んだ後のスタックポインタを渡す。
pub fn call_frame(saved: &user_regs_struct, function: u64, sp: u64, args: &[u64]) -> user_regs_struct {
    let mut regs = *saved;
    regs.rsp = sp;
    regs.rip = function;
    regs.rax = 0;
    // 中断中のシステムコールの再開処理に巻き込まれないようにする
    regs.orig_rax = u64::MAX;
    for (slot, value) in args.iter().take(MAX_REGISTER_ARGS).enumerate() {
        set_argument(&mut regs, slot, *value);
    }
    regs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed() -> user_regs_struct {
        // user_regs_structはすべて整数フィールド
        unsafe { std::mem::zeroed() }
    }

    #[test]
    fn test_set_argument_order() {
        let mut regs = zeroed();
        for slot in 0..MAX_REGISTER_ARGS {
            set_argument(&mut regs, slot, slot as u64 + 1);
        }
        assert_eq!(
            [regs.rdi, regs.rsi, regs.rdx, regs.rcx, regs.r8, regs.r9],
            [1, 2, 3, 4, 5, 6]
        );
    }

    #[test]
    fn test_call_frame() {
        let mut saved = zeroed();
        saved.rbx = 0x1234;
        saved.rax = 99;
        saved.orig_rax = 0;

        let regs = call_frame(&saved, 0x401000, 0x7ff0_0008, &[7, 8]);
        assert_eq!(regs.rip, 0x401000);
        assert_eq!(regs.rsp, 0x7ff0_0008);
        assert_eq!(regs.rax, 0);
        assert_eq!(regs.orig_rax, u64::MAX);
        assert_eq!((regs.rdi, regs.rsi), (7, 8));
        // 呼び出し先保存レジスタはそのまま
        assert_eq!(regs.rbx, 0x1234);
    }
}
