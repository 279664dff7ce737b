//! ターゲットプロセス内での関数呼び出し
//!
//! 停止中のプロセスのレジスタを書き換えて任意の関数を実行させる。
//! System V x86-64 ABIに従い、整数引数はレジスタ（rdi, rsi, rdx, rcx, r8, r9）で渡す。
//! 文字列や出力バッファは現在のスタックのレッドゾーンより下に配置する。
//!
//! 戻りアドレスには呼び出し側が指定したトラップアドレスを積み、そこにINT3を置く。
//! 関数がreturnするとSIGTRAPで停止するので、戻り値（rax）を回収してから
//! 書き換えたスタック領域とトラップのバイト、元のレジスタを書き戻す。

use crate::registers::{call_frame, MAX_REGISTER_ARGS};
use crate::{Memory, Process, Registers, Result, SoftwareBreakpoint, StopReason};
use nix::libc::user_regs_struct;
use tracing::debug;

/// x86-64のレッドゾーン
const RED_ZONE: u64 = 128;

const STACK_ALIGN: u64 = 16;

/// 関数呼び出しの引数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// レジスタにそのまま渡す値
    Word(u64),
    /// スタック上に書き込み、その先頭アドレスを渡すバイト列
    Bytes(Vec<u8>),
    /// ゼロ埋めした領域を確保してアドレスを渡し、呼び出し後に内容を回収する
    OutBuffer(usize),
}

/// 関数呼び出しの結果
#[derive(Debug, Clone, Default)]
pub struct CallResult {
    /// raxの値
    pub return_value: u64,
    /// `CallArg::OutBuffer`の内容（引数の順）
    pub out_buffers: Vec<Vec<u8>>,
}

/// 関数呼び出しの実行器
pub struct FunctionCall<'a> {
    process: &'a mut Process,
    memory: &'a Memory,
    registers: &'a Registers,
    return_trap: u64,
}

impl<'a> FunctionCall<'a> {
    /// 呼び出し器を作成する
    ///
    /// `return_trap`は実行されることのない命令アドレス（ELFのエントリポイント等）を指定する。
    pub fn new(
        process: &'a mut Process,
        memory: &'a Memory,
        registers: &'a Registers,
        return_trap: u64,
    ) -> Self {
        Self {
            process,
            memory,
            registers,
            return_trap,
        }
    }

    /// `function`のアドレスにある関数を`args`で呼び出す
    pub fn invoke(&mut self, function: u64, args: &[CallArg]) -> Result<CallResult> {
        if args.len() > MAX_REGISTER_ARGS {
            return Err(anyhow::anyhow!(
                "Too many arguments: {} (at most {} supported)",
                args.len(),
                MAX_REGISTER_ARGS
            ));
        }
        if self.process.has_exited() {
            return Err(anyhow::anyhow!("Process has exited"));
        }

        let saved = self.registers.read()?;
        let frame = FrameLayout::new(saved.rsp, args);
        let scratch = self.memory.read(frame.sp as usize, frame.scratch_len())?;
        let mut trap = SoftwareBreakpoint::new(self.return_trap);
        trap.enable(self.memory)?;

        let outcome = self.run(function, args, &saved, &frame, &trap);

        if self.process.has_exited() {
            return outcome;
        }

        // 後片付けの失敗より呼び出し自体の失敗を優先して返す
        let restored = self
            .memory
            .write(frame.sp as usize, &scratch)
            .and_then(|_| trap.disable(self.memory))
            .and_then(|_| self.registers.write(saved));
        match (outcome, restored) {
            (Ok(result), Ok(())) => Ok(result),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    fn run(
        &mut self,
        function: u64,
        args: &[CallArg],
        saved: &user_regs_struct,
        frame: &FrameLayout,
        trap: &SoftwareBreakpoint,
    ) -> Result<CallResult> {
        let mut words = Vec::with_capacity(args.len());
        let mut out_slots = Vec::new();

        for (arg, placement) in args.iter().zip(&frame.placements) {
            match (arg, placement) {
                (CallArg::Word(value), _) => words.push(*value),
                (CallArg::Bytes(bytes), Some(addr)) => {
                    self.memory.write(*addr as usize, bytes)?;
                    words.push(*addr);
                }
                (CallArg::OutBuffer(size), Some(addr)) => {
                    self.memory.write(*addr as usize, &vec![0u8; *size])?;
                    out_slots.push((*addr, *size));
                    words.push(*addr);
                }
                (_, None) => return Err(anyhow::anyhow!("No stack slot for {:?}", arg)),
            }
        }

        self.memory.write_u64(frame.sp as usize, self.return_trap)?;
        self.registers
            .write(call_frame(saved, function, frame.sp, &words))?;

        debug!(
            "calling 0x{:x} with {} args, return trap 0x{:x}, {} scratch bytes",
            function,
            args.len(),
            self.return_trap,
            frame.scratch_len()
        );

        match self.process.continue_and_wait()? {
            StopReason::Trap => {}
            reason => {
                return Err(anyhow::anyhow!(
                    "Call to 0x{:x} stopped unexpectedly: {:?}",
                    function,
                    reason
                ))
            }
        }

        let after = self.registers.read()?;
        if !trap.trapped_at(after.rip) {
            return Err(anyhow::anyhow!(
                "Call to 0x{:x} trapped at 0x{:x} instead of returning",
                function,
                after.rip
            ));
        }

        let mut out_buffers = Vec::with_capacity(out_slots.len());
        for (addr, size) in out_slots {
            out_buffers.push(self.memory.read(addr as usize, size)?);
        }

        Ok(CallResult {
            return_value: after.rax,
            out_buffers,
        })
    }
}

/// 呼び出し用に確保するスタック領域の配置
///
/// 書き換えるのは`[sp, rsp - RED_ZONE)`の範囲だけで、呼び出し後に元へ戻す。
#[derive(Debug, PartialEq, Eq)]
struct FrameLayout {
    /// 引数ごとの配置先（レジスタ渡しの値はNone）
    placements: Vec<Option<u64>>,
    /// 戻りアドレスを積んだ位置。関数入口でのrsp
    sp: u64,
    /// レッドゾーンの下端
    top: u64,
}

impl FrameLayout {
    fn new(rsp: u64, args: &[CallArg]) -> Self {
        let top = rsp - RED_ZONE;
        let mut cursor = top;
        let placements = args
            .iter()
            .map(|arg| {
                let size = match arg {
                    CallArg::Word(_) => return None,
                    CallArg::Bytes(bytes) => bytes.len(),
                    CallArg::OutBuffer(size) => *size,
                };
                cursor = align_down(cursor - size as u64, STACK_ALIGN);
                Some(cursor)
            })
            .collect();

        // 関数の入口ではrsp + 8が16バイト境界になる
        let sp = align_down(cursor, STACK_ALIGN) - 8;
        Self { placements, sp, top }
    }

    fn scratch_len(&self) -> usize {
        (self.top - self.sp) as usize
    }
}

fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(0x1000, 16), 0x1000);
        assert_eq!(align_down(0x100f, 16), 0x1000);
        assert_eq!(align_down(0x1011, 16), 0x1010);
    }

    #[test]
    fn test_frame_layout_covers_every_written_byte() {
        let rsp = 0x7fff_f000;
        let args = [
            CallArg::Word(1),
            CallArg::OutBuffer(100),
            CallArg::Bytes(b"KTRACE\0".to_vec()),
        ];
        let frame = FrameLayout::new(rsp, &args);

        assert_eq!(frame.top, rsp - RED_ZONE);
        assert_eq!(frame.placements[0], None);
        let out = frame.placements[1].unwrap();
        let bytes = frame.placements[2].unwrap();

        // 出力バッファとバイト列はレッドゾーンの下に重ならずに置かれる
        assert!(out + 100 <= frame.top);
        assert!(bytes + 7 <= out);
        assert_eq!(out % STACK_ALIGN, 0);
        assert_eq!(bytes % STACK_ALIGN, 0);

        // 戻りアドレスも退避範囲に含まれる
        assert!(frame.sp + 8 <= bytes);
        assert_eq!((frame.sp + 8) % STACK_ALIGN, 0);
        assert_eq!(frame.scratch_len() as u64, frame.top - frame.sp);
    }

    #[test]
    fn test_frame_layout_without_stack_arguments() {
        let frame = FrameLayout::new(0x1000 + RED_ZONE, &[CallArg::Word(0)]);
        assert_eq!(frame.sp, 0x1000 - 8);
        assert_eq!(frame.scratch_len(), 8);
    }
}
