//! ターゲット検査コマンドの実行と出力
//!
//! `info` / `dbg` / `modes`をInfoQueryとModeRegistryに振り分け、
//! オペレータ向けの文字列を出力チャネルに書く。

use crate::access::TargetAccess;
use crate::command::Command;
use crate::config::ModeTableLayout;
use crate::errors::CommandError;
use crate::info::{InfoQuery, QueryInvocation, INFO_USAGE};
use crate::modes::ModeRegistry;
use std::io::Write;

/// 有効なモードがないときの表示
pub const NO_ACTIVE_MODES: &str = "No active modes.";

/// ターゲット検査コマンドを実行する
///
/// ターゲットに関係しないコマンドなら何もせず`Ok(false)`を返す。
pub fn execute_target_command<T, W>(
    target: &T,
    layout: &ModeTableLayout,
    command: &Command,
    out: &mut W,
) -> Result<bool, CommandError>
where
    T: TargetAccess + ?Sized,
    W: Write + ?Sized,
{
    match command {
        Command::Info(args) => run_info(target, args, out)?,
        Command::Dbg(args) => run_dbg(target, layout, args, out)?,
        Command::Modes => run_modes(target, layout, out)?,
        _ => return Ok(false),
    }
    Ok(true)
}

/// `info <function> [<argument>]`
pub fn run_info<T, W>(target: &T, args: &[String], out: &mut W) -> Result<(), CommandError>
where
    T: TargetAccess + ?Sized,
    W: Write + ?Sized,
{
    let invocation = match QueryInvocation::from_tokens(args) {
        Ok(invocation) => invocation,
        Err(e) => {
            writeln!(out, "{}", INFO_USAGE)?;
            return Err(e);
        }
    };

    let text = InfoQuery::new(target).execute(&invocation)?;
    write!(out, "{}", text)?;
    Ok(())
}

/// `dbg [<mode> | -<mode> ...]`
pub fn run_dbg<T, W>(
    target: &T,
    layout: &ModeTableLayout,
    args: &[String],
    out: &mut W,
) -> Result<(), CommandError>
where
    T: TargetAccess + ?Sized,
    W: Write + ?Sized,
{
    let registry = ModeRegistry::new(target, layout);

    if args.is_empty() {
        let active = registry.report_active_modes()?;
        if active.is_empty() {
            writeln!(out, "{}", NO_ACTIVE_MODES)?;
        } else {
            writeln!(out, "{}", active)?;
        }
        return Ok(());
    }

    let report = registry.apply(args)?;
    for warning in &report.warnings {
        writeln!(out, "warning: {}", warning)?;
    }
    for (token, error) in &report.failures {
        writeln!(out, "error: cannot apply \"{}\": {}", token, error)?;
    }

    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(CommandError::Toggle {
            failed: report.failures.len(),
        })
    }
}

/// `modes`: 全モードを表の順に表示し、有効なものに`*`を付ける
pub fn run_modes<T, W>(target: &T, layout: &ModeTableLayout, out: &mut W) -> Result<(), CommandError>
where
    T: TargetAccess + ?Sized,
    W: Write + ?Sized,
{
    let entries = ModeRegistry::new(target, layout).entries()?;
    if entries.is_empty() {
        writeln!(out, "No debug modes defined.")?;
        return Ok(());
    }

    for entry in entries {
        let marker = if entry.active { '*' } else { ' ' };
        writeln!(out, "{} {}", marker, entry.name)?;
    }
    Ok(())
}
