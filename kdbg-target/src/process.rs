//! プロセス制御機能

use crate::Result;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::ffi::CString;
use std::path::Path;
use tracing::debug;

/// 停止イベントの種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// SIGTRAPによる停止（ブレークポイントまたはトラップ命令）
    Trap,
    /// シングルステップ完了
    Step,
    /// シグナル受信による停止
    Signal(Signal),
    /// プロセス終了
    Exited(i32),
    /// シグナルによる強制終了
    Killed(Signal),
    /// その他の停止
    Other,
}

impl StopReason {
    /// プロセスがもう存在しないかどうか
    pub fn is_terminal(&self) -> bool {
        matches!(self, StopReason::Exited(_) | StopReason::Killed(_))
    }

    fn from_wait_status(status: WaitStatus, trap: StopReason) -> Self {
        match status {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => trap,
            WaitStatus::Stopped(_, signal) => StopReason::Signal(signal),
            WaitStatus::Exited(_, code) => StopReason::Exited(code),
            WaitStatus::Signaled(_, signal, _) => StopReason::Killed(signal),
            _ => StopReason::Other,
        }
    }
}

/// 検査対象のプロセス
///
/// ptraceで停止させたまま保持し、Drop時にデタッチする。
pub struct Process {
    pid: Pid,
    exited: bool,
}

impl Process {
    /// 実行可能ファイルを起動し、execve直後で停止した状態で返す
    ///
    /// execve直後はまだローダーが動いていないため、1命令だけ進めて
    /// メモリマッピングが揃った状態にしてから返す。
    pub fn spawn<P: AsRef<Path>>(program: P, args: &[String]) -> Result<Self> {
        use nix::unistd::{execve, fork, ForkResult};

        let program_path = program
            .as_ref()
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid program path"))?;
        let program_cstring = CString::new(program_path)?;

        let mut argv = vec![program_cstring.clone()];
        for arg in args {
            argv.push(CString::new(arg.as_str())?);
        }

        let env: Vec<CString> = std::env::vars()
            .map(|(key, val)| CString::new(format!("{}={}", key, val)).map_err(anyhow::Error::from))
            .collect::<Result<Vec<_>>>()?;

        match unsafe { fork()? } {
            ForkResult::Parent { child } => {
                match waitpid(child, None)? {
                    WaitStatus::Stopped(_, _) => {}
                    WaitStatus::Exited(_, code) => {
                        return Err(anyhow::anyhow!(
                            "Failed to execute {} (child exited with {})",
                            program_path,
                            code
                        ))
                    }
                    status => {
                        return Err(anyhow::anyhow!(
                            "Unexpected wait status after execve: {:?}",
                            status
                        ))
                    }
                }

                ptrace::step(child, None)?;
                match waitpid(child, None)? {
                    WaitStatus::Stopped(_, _) => {
                        debug!("spawned {} as pid {}", program_path, child);
                        Ok(Self { pid: child, exited: false })
                    }
                    status => Err(anyhow::anyhow!(
                        "Unexpected wait status after step: {:?}",
                        status
                    )),
                }
            }
            ForkResult::Child => {
                if ptrace::traceme().is_ok() {
                    let _ = execve(&program_cstring, &argv, &env);
                }
                // 失敗した子がデバッガのコピーとして動き続けないようにする
                unsafe { nix::libc::_exit(127) }
            }
        }
    }

    /// 既存のプロセスにアタッチし、停止を待つ
    pub fn attach(pid: i32) -> Result<Self> {
        let pid = Pid::from_raw(pid);
        ptrace::attach(pid)?;

        match waitpid(pid, None)? {
            WaitStatus::Stopped(_, _) => {
                debug!("attached to pid {}", pid);
                Ok(Self { pid, exited: false })
            }
            status => Err(anyhow::anyhow!(
                "Unexpected wait status after attach: {:?}",
                status
            )),
        }
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// プロセスが終了済みかどうか
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// プロセスを実行継続して次の停止イベントを待つ
    pub fn continue_and_wait(&mut self) -> Result<StopReason> {
        ptrace::cont(self.pid, None)?;
        self.wait(StopReason::Trap)
    }

    /// 1命令だけ実行して停止する
    pub fn step(&mut self) -> Result<StopReason> {
        ptrace::step(self.pid, None)?;
        self.wait(StopReason::Step)
    }

    fn wait(&mut self, trap: StopReason) -> Result<StopReason> {
        let status = waitpid(self.pid, None)?;
        let reason = StopReason::from_wait_status(status, trap);
        if reason.is_terminal() {
            self.exited = true;
        }
        debug!("pid {} stopped: {:?}", self.pid, reason);
        Ok(reason)
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if !self.exited {
            let _ = ptrace::detach(self.pid, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_missing_program_fails_in_parent() {
        let err = Process::spawn("/nonexistent/kdbg-no-such-program", &[])
            .err()
            .expect("spawning a missing program should fail");
        // 子はexecveの失敗後に終了し、エラーは親にだけ返る
        assert!(err.to_string().contains("child exited with 127"), "{}", err);
    }
}
