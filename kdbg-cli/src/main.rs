//! kdbg CLI - コマンドラインインターフェース
//!
//! 稼働中のカーネル風プロセスを検査するデバッガ kdbg のREPLインターフェース

mod completer;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use completer::KdbgHelper;
use kdbg_core::info::INFO_USAGE;
use kdbg_core::modes::DBG_USAGE;
use kdbg_core::shell::execute_target_command;
use kdbg_core::{CallConfig, Command, Debugger, ModeTableLayout, StopReason};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// kdbg - Kernel debug-mode inspector
#[derive(Parser)]
#[command(name = "kdbg")]
#[command(version)]
#[command(about = "Inspect info functions and debug modes of a running kernel-like process", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: DebugCommand,

    #[command(flatten)]
    layout: LayoutArgs,

    /// Size of the buffer handed to info functions
    #[arg(long, global = true, default_value_t = 32768)]
    info_buffer: usize,

    /// Run a command non-interactively, then exit (repeatable)
    #[arg(short, long = "eval", global = true)]
    eval: Vec<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

/// デバッグモード表の配置
#[derive(Args)]
struct LayoutArgs {
    /// Global array holding the debug mode table
    #[arg(long, global = true, default_value = "dbg_tab")]
    mode_table: String,

    /// Field of a table entry holding the mode name
    #[arg(long, global = true, default_value = "d_name")]
    name_field: String,

    /// Field of a table entry holding the mode bits
    #[arg(long, global = true, default_value = "d_mode")]
    mode_field: String,

    /// Global variable holding the active mode mask
    #[arg(long, global = true, default_value = "dbg_modes")]
    active_mask: String,

    /// Info function rendering the active modes
    #[arg(long, global = true, default_value = "dbg_modes_info")]
    active_query: String,

    /// Function adding (or with a '-' prefix, removing) a mode
    #[arg(long, global = true, default_value = "dbg_add_mode")]
    mutator: String,

    /// Upper bound on table entries read before giving up
    #[arg(long, global = true, default_value_t = 256, value_parser = parse_max_modes)]
    max_modes: usize,
}

fn parse_max_modes(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

impl From<LayoutArgs> for ModeTableLayout {
    fn from(args: LayoutArgs) -> Self {
        Self {
            table: args.mode_table,
            name_field: args.name_field,
            mode_field: args.mode_field,
            active_mask: args.active_mask,
            active_query: args.active_query,
            mutator: args.mutator,
            max_entries: args.max_modes,
        }
    }
}

#[derive(Subcommand)]
enum DebugCommand {
    /// Launch and inspect an executable
    Run {
        /// Path to the executable binary
        binary: String,

        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Attach to an existing process
    Attach {
        /// Path to the executable binary
        binary: String,

        /// Process ID to attach to
        #[arg(short, long)]
        pid: i32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let call_config = CallConfig {
        info_buffer_size: cli.info_buffer,
        ..CallConfig::default()
    };
    let layout = ModeTableLayout::from(cli.layout);
    let debugger = init_debugger(cli.command, call_config)?;
    let debugger = Rc::new(RefCell::new(debugger));

    if !cli.eval.is_empty() {
        let failed = run_batch(&debugger, &layout, &cli.eval);
        // exitはデストラクタを呼ばないので、先にデタッチさせる
        drop(debugger);
        std::process::exit(if failed { 1 } else { 0 });
    }

    println!("kdbg {}", env!("CARGO_PKG_VERSION"));
    run_repl(debugger, layout)
}

/// ログ出力を初期化する（RUST_LOGを優先）
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// デバッガを初期化してプロセスにアタッチまたは起動する
fn init_debugger(command: DebugCommand, call_config: CallConfig) -> Result<Debugger> {
    let mut debugger = Debugger::with_call_config(call_config);

    match command {
        DebugCommand::Run { binary, args } => {
            debugger.load_binary(&binary)?;
            info!("loaded symbols from {}", binary);

            debugger.spawn(&binary, &args)?;
            println!("Process started and stopped at first instruction");
        }
        DebugCommand::Attach { binary, pid } => {
            debugger.load_binary(&binary)?;
            info!("loaded symbols from {}", binary);

            debugger.attach(pid)?;
            println!("Attached to process {}", pid);
        }
    }

    Ok(debugger)
}

/// `-e`で渡されたコマンドを順に実行する。失敗があればtrue
fn run_batch(debugger: &Rc<RefCell<Debugger>>, layout: &ModeTableLayout, lines: &[String]) -> bool {
    let mut failed = false;
    for line in lines {
        match handle_line(&mut debugger.borrow_mut(), layout, line) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                failed = true;
            }
        }
    }
    failed
}

/// REPLループを実行する
fn run_repl(debugger: Rc<RefCell<Debugger>>, layout: ModeTableLayout) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");

    let helper = KdbgHelper::new(Rc::clone(&debugger), layout.clone());
    let mut rl: Editor<KdbgHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(helper));

    loop {
        match rl.readline("(kdbg) ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                match handle_line(&mut debugger.borrow_mut(), &layout, line) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

enum Flow {
    Continue,
    Quit,
}

fn handle_line(debugger: &mut Debugger, layout: &ModeTableLayout, line: &str) -> Result<Flow> {
    let Some(command) = Command::parse(line)? else {
        return Ok(Flow::Continue);
    };
    debug!("command {:?}", command);

    if command.touches_target() {
        let mut out = io::stdout().lock();
        let result = execute_target_command(&*debugger, layout, &command, &mut out);
        out.flush()?;
        result?;
        return Ok(Flow::Continue);
    }

    match command {
        Command::Help => print_help(),
        Command::Quit => return Ok(Flow::Quit),
        Command::Break(location) => handle_break(debugger, &location)?,
        Command::Continue => handle_continue(debugger)?,
        Command::Unknown(name) => {
            println!("Unknown command: {}", name);
            println!("Type 'help' for available commands.");
        }
        Command::Info(_) | Command::Dbg(_) | Command::Modes => {}
    }
    Ok(Flow::Continue)
}

/// Breakコマンドを処理する
fn handle_break(debugger: &mut Debugger, location: &str) -> Result<()> {
    let (id, address) = debugger.set_breakpoint_at(location)?;
    println!("Breakpoint {} set at 0x{:x}", id, address);
    Ok(())
}

/// Continueコマンドを処理する
fn handle_continue(debugger: &mut Debugger) -> Result<()> {
    match debugger.continue_and_wait()? {
        StopReason::Trap | StopReason::Step => {
            let pc = debugger.get_pc()?;
            match debugger.reverse_resolve(pc) {
                Some(symbol) => println!("Stopped at 0x{:x} in {}", pc, symbol.name),
                None => println!("Stopped at 0x{:x}", pc),
            }
        }
        StopReason::Signal(signal) => println!("Received signal: {:?}", signal),
        StopReason::Exited(code) => println!("Process exited with code {}", code),
        StopReason::Killed(signal) => println!("Process killed by signal {:?}", signal),
        StopReason::Other => println!("Process stopped (unknown reason)"),
    }
    Ok(())
}

fn print_help() {
    println!("Target commands:");
    println!();
    println!("{}", INFO_USAGE);
    println!();
    println!("{}", DBG_USAGE);
    println!();
    println!("usage: modes");
    println!("    Lists every debug mode; active ones are marked with '*'.");
    println!();
    println!("Session commands:");
    println!("  break <loc>    - Set breakpoint at symbol or address");
    println!("  continue (c)   - Continue execution");
    println!("  help           - Show this help message");
    println!("  quit/exit/q    - Exit the debugger");
    println!();
    println!("Examples:");
    println!("  info proc_info");
    println!("  info vm_info \"init\"");
    println!("  dbg KTRACE -PROC");
}
