//! ptraceセッションによるターゲットアクセス
//!
//! ELFシンボルとDWARF型情報を使ってグローバル変数をたどり、
//! ターゲット内の関数はレジスタを書き換えて直接呼び出す。

use crate::access::{Literal, TargetAccess, Value};
use crate::breakpoint::{BreakpointId, BreakpointManager};
use crate::config::CallConfig;
use crate::errors::{TargetError, ERR_NOT_ATTACHED};
use crate::expr::{parse_expression, Expression};
use crate::parse::parse_address;
use crate::Result;
use kdbg_dwarf::{DwarfLoader, GlobalTypeResolver, Symbol, SymbolResolver, TypeInfo};
use kdbg_target::{CallArg, CallResult, FunctionCall, Memory, Process, Registers, StopReason};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// デバッガ
pub struct Debugger {
    /// 検査対象プロセス（関数呼び出しで可変借用する）
    process: RefCell<Option<Process>>,
    memory: Option<Memory>,
    registers: Option<Registers>,
    dwarf_loader: Option<DwarfLoader>,
    symbol_resolver: Option<SymbolResolver>,
    breakpoint_manager: BreakpointManager,
    /// PIEのロードベース（非PIEなら0）
    load_bias: u64,
    /// グローバル変数名 -> 型（ELF由来の静的情報なのでキャッシュしてよい）
    global_types: RefCell<HashMap<String, TypeInfo>>,
    call_config: CallConfig,
}

impl Debugger {
    /// 新しいデバッガを作成する
    pub fn new() -> Self {
        Self::with_call_config(CallConfig::default())
    }

    pub fn with_call_config(call_config: CallConfig) -> Self {
        Self {
            process: RefCell::new(None),
            memory: None,
            registers: None,
            dwarf_loader: None,
            symbol_resolver: None,
            breakpoint_manager: BreakpointManager::new(),
            load_bias: 0,
            global_types: RefCell::new(HashMap::new()),
            call_config,
        }
    }

    /// 実行可能ファイルを起動して検査を開始する
    ///
    /// プロセスはexecve直後に停止した状態で始まる。
    pub fn spawn<P: AsRef<Path>>(&mut self, program: P, args: &[String]) -> Result<()> {
        let process = Process::spawn(program, args)?;
        self.install_process(process)
    }

    /// 既存のプロセスにアタッチする
    pub fn attach(&mut self, pid: i32) -> Result<()> {
        let process = Process::attach(pid)?;
        self.install_process(process)
    }

    fn install_process(&mut self, process: Process) -> Result<()> {
        let pid = process.pid();
        self.memory = Some(Memory::new(pid));
        self.registers = Some(Registers::new(pid));
        *self.process.get_mut() = Some(process);
        self.update_load_bias()
    }

    /// ELFバイナリからシンボルとDWARF情報を読み込む
    pub fn load_binary<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let loader = DwarfLoader::load(path)?;
        let resolver = SymbolResolver::new(&loader)?;
        self.dwarf_loader = Some(loader);
        self.symbol_resolver = Some(resolver);
        self.global_types.get_mut().clear();
        self.update_load_bias()
    }

    fn update_load_bias(&mut self) -> Result<()> {
        self.load_bias = match (&self.symbol_resolver, &self.memory) {
            (Some(resolver), Some(memory)) if resolver.is_pie() => memory.get_base_address()? as u64,
            _ => 0,
        };
        debug!("load bias 0x{:x}", self.load_bias);
        Ok(())
    }

    /// プロセスにアタッチ済みか
    pub fn is_attached(&self) -> bool {
        self.process
            .borrow()
            .as_ref()
            .is_some_and(|p| !p.has_exited())
    }

    fn require_memory(&self) -> std::result::Result<&Memory, TargetError> {
        self.memory.as_ref().ok_or(TargetError::NotAttached)
    }

    fn require_registers(&self) -> Result<&Registers> {
        self.registers
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!(ERR_NOT_ATTACHED))
    }

    fn require_symbols(&self) -> std::result::Result<&SymbolResolver, TargetError> {
        self.symbol_resolver
            .as_ref()
            .ok_or_else(|| TargetError::Backend(anyhow::anyhow!("No binary loaded")))
    }

    /// シンボル名から実行時アドレスを解決する
    pub fn resolve_symbol(&self, name: &str) -> Option<u64> {
        let address = self.symbol_resolver.as_ref()?.resolve(name)?;
        Some(address + self.load_bias)
    }

    fn runtime_address(&self, name: &str) -> std::result::Result<u64, TargetError> {
        self.require_symbols()?;
        self.resolve_symbol(name)
            .ok_or_else(|| TargetError::SymbolNotFound(name.to_string()))
    }

    /// 実行時アドレスからシンボルを逆引きする
    pub fn reverse_resolve(&self, addr: u64) -> Option<Symbol> {
        self.symbol_resolver
            .as_ref()?
            .reverse_resolve(addr.checked_sub(self.load_bias)?)
    }

    /// 接頭辞で始まる関数名（info関数の補完用）
    pub fn function_names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.symbol_resolver
            .as_ref()
            .map(|r| r.function_names_with_prefix(prefix))
            .unwrap_or_default()
    }

    /// シンボル名またはアドレスにブレークポイントを設定する
    pub fn set_breakpoint_at(&mut self, location: &str) -> Result<(BreakpointId, u64)> {
        let address = match parse_address(location) {
            Ok(address) => address,
            Err(_) => self
                .resolve_symbol(location)
                .ok_or_else(|| anyhow::anyhow!("Symbol not found: {}", location))?,
        };

        let memory = self
            .memory
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!(ERR_NOT_ATTACHED))?;
        let id = self.breakpoint_manager.insert(address, memory)?;
        Ok((id, address))
    }

    /// プロセスを実行継続して次の停止を待つ
    ///
    /// 現在のPCにブレークポイントがあれば、一旦外して1命令進めてから戻す。
    /// ブレークポイントで止まった場合はPCをその命令の先頭に巻き戻す。
    pub fn continue_and_wait(&mut self) -> Result<StopReason> {
        let memory = self
            .memory
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!(ERR_NOT_ATTACHED))?;
        let registers = self
            .registers
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!(ERR_NOT_ATTACHED))?;
        let mut guard = self.process.borrow_mut();
        let process = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!(ERR_NOT_ATTACHED))?;

        let pc = registers.get_pc()?;
        if self.breakpoint_manager.suspend_at(pc, memory)? {
            let reason = process.step()?;
            if reason.is_terminal() {
                return Ok(reason);
            }
            self.breakpoint_manager.resume_at(pc, memory)?;
        }

        let reason = process.continue_and_wait()?;
        if reason == StopReason::Trap {
            let pc = registers.get_pc()?;
            if let Some(hit) = self.breakpoint_manager.hit_by(pc) {
                registers.set_pc(hit)?;
            }
        }
        Ok(reason)
    }

    /// プログラムカウンタを取得する
    pub fn get_pc(&self) -> Result<u64> {
        self.require_registers()?.get_pc()
    }

    /// グローバル変数の型をDWARFから取得する
    fn global_type(&self, name: &str) -> std::result::Result<TypeInfo, TargetError> {
        if let Some(cached) = self.global_types.borrow().get(name) {
            return Ok(cached.clone());
        }

        let loader = self
            .dwarf_loader
            .as_ref()
            .ok_or_else(|| TargetError::Backend(anyhow::anyhow!("No binary loaded")))?;
        let type_info = GlobalTypeResolver::new(loader)
            .find(name)?
            .ok_or_else(|| TargetError::evaluation(name, "no debug information for global"))?;

        self.global_types
            .borrow_mut()
            .insert(name.to_string(), type_info.clone());
        Ok(type_info)
    }

    /// 式が指すオブジェクトのアドレスと型を求める
    fn locate(&self, expr: &Expression) -> std::result::Result<(u64, TypeInfo), TargetError> {
        match expr {
            Expression::Variable(name) => {
                let address = self.runtime_address(name)?;
                Ok((address, self.global_type(name)?))
            }
            Expression::FieldAccess { base, field } => {
                let (address, type_info) = self.locate(base)?;
                let field_info = type_info.field(field).ok_or_else(|| {
                    TargetError::evaluation(
                        expr,
                        format!("no field '{}' in {}", field, type_info.type_name()),
                    )
                })?;
                let field_type = field_info
                    .type_info
                    .as_deref()
                    .cloned()
                    .unwrap_or(TypeInfo::Unknown);
                Ok((address + field_info.offset, field_type))
            }
            Expression::IndexAccess { base, index } => {
                let (address, type_info) = self.locate(base)?;
                let index = *index as u64;
                let (start, element) = match type_info {
                    TypeInfo::Array {
                        element_type,
                        length,
                    } => {
                        if let Some(len) = length {
                            if index >= len {
                                return Err(TargetError::evaluation(
                                    expr,
                                    format!("index {} out of bounds (length: {})", index, len),
                                ));
                            }
                        }
                        (address, element_type)
                    }
                    TypeInfo::Pointer { pointee_type, .. } => {
                        let pointer = self.require_memory()?.read_u64(address as usize)?;
                        if pointer == 0 {
                            return Err(TargetError::evaluation(expr, "null pointer"));
                        }
                        (pointer, pointee_type)
                    }
                    other => {
                        return Err(TargetError::evaluation(
                            expr,
                            format!("cannot index {}", other.type_name()),
                        ))
                    }
                };

                let element = element
                    .ok_or_else(|| TargetError::evaluation(expr, "unknown element type"))?;
                let element_size = element.size();
                if element_size == 0 {
                    return Err(TargetError::evaluation(expr, "unknown element size"));
                }
                Ok((start + index * element_size, *element))
            }
        }
    }

    /// 型に従ってアドレスの値を読む
    fn read_value(
        &self,
        expr: &Expression,
        address: u64,
        type_info: &TypeInfo,
    ) -> std::result::Result<Value, TargetError> {
        let memory = self.require_memory()?;

        match type_info {
            TypeInfo::Pointer { .. } => {
                let pointer = memory.read_u64(address as usize)?;
                if pointer == 0 {
                    Ok(Value::Null)
                } else if type_info.is_c_string() {
                    let text = memory.read_cstring(pointer as usize, self.call_config.max_string_len)?;
                    Ok(Value::String(text))
                } else {
                    Ok(Value::Pointer(pointer))
                }
            }
            TypeInfo::Primitive { size, .. } | TypeInfo::Enum { size, .. } => {
                let value = memory
                    .read_uint(address as usize, *size as usize)
                    .map_err(|e| TargetError::evaluation(expr, e))?;
                Ok(Value::Integer(value))
            }
            TypeInfo::Struct { .. } | TypeInfo::Union { .. } | TypeInfo::Array { .. } => {
                Ok(Value::Composite {
                    address,
                    type_name: type_info.type_name(),
                })
            }
            TypeInfo::Unknown => Err(TargetError::evaluation(expr, "unknown type")),
        }
    }

    /// info関数のデータ引数を解決する
    ///
    /// 引用符付きなら文字列として書き込み、`NULL`はヌルポインタ、数値ならアドレス、
    /// それ以外は式として評価した値（集約型ならそのアドレス）を渡す。
    fn resolve_argument(&self, argument: &str) -> std::result::Result<Literal, TargetError> {
        let trimmed = argument.trim();
        if let Some(text) = trimmed
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return Ok(Literal::Str(text.to_string()));
        }
        if trimmed == "NULL" {
            return Ok(Literal::Null);
        }
        if let Ok(address) = parse_address(trimmed) {
            return Ok(Literal::Integer(address));
        }

        let expr = parse_expression(trimmed).map_err(|e| TargetError::evaluation(trimmed, e))?;
        let (address, type_info) = self.locate(&expr)?;
        let word = match type_info {
            TypeInfo::Struct { .. } | TypeInfo::Union { .. } | TypeInfo::Array { .. } => address,
            other => {
                let size = other.size();
                self.require_memory()?
                    .read_uint(address as usize, size as usize)
                    .map_err(|e| TargetError::evaluation(&expr, e))?
            }
        };
        Ok(Literal::Integer(word))
    }

    /// ターゲット内の関数を呼び出す
    fn invoke(&self, function: &str, args: &[CallArg]) -> std::result::Result<CallResult, TargetError> {
        let address = self.runtime_address(function)?;
        let memory = self.require_memory()?;
        let registers = self
            .registers
            .as_ref()
            .ok_or(TargetError::NotAttached)?;
        let return_trap = self
            .dwarf_loader
            .as_ref()
            .map(|loader| loader.entry_point() + self.load_bias)
            .ok_or_else(|| TargetError::Backend(anyhow::anyhow!("No binary loaded")))?;

        let mut guard = self.process.borrow_mut();
        let process = guard.as_mut().ok_or(TargetError::NotAttached)?;
        if process.has_exited() {
            return Err(TargetError::NotAttached);
        }

        debug!("invoking {} at 0x{:x}", function, address);
        FunctionCall::new(process, memory, registers, return_trap)
            .invoke(address, args)
            .map_err(|e| TargetError::call_failed(function, e))
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

fn literal_arg(literal: &Literal) -> CallArg {
    match literal {
        Literal::Null => CallArg::Word(0),
        Literal::Integer(value) => CallArg::Word(*value),
        Literal::Str(text) => {
            let mut bytes = text.as_bytes().to_vec();
            bytes.push(0);
            CallArg::Bytes(bytes)
        }
    }
}

impl TargetAccess for Debugger {
    fn evaluate(&self, expr: &Expression) -> std::result::Result<Value, TargetError> {
        let (address, type_info) = self.locate(expr)?;
        let value = self.read_value(expr, address, &type_info)?;
        debug!("{} = {}", expr, value);
        Ok(value)
    }

    fn call_function(&self, name: &str, argument: &Literal) -> std::result::Result<(), TargetError> {
        debug!("call {}({})", name, argument);
        self.invoke(name, &[literal_arg(argument)])?;
        Ok(())
    }

    fn query_string(
        &self,
        function: &str,
        argument: Option<&str>,
    ) -> std::result::Result<String, TargetError> {
        let data = match argument {
            Some(argument) => self.resolve_argument(argument)?,
            None => Literal::Null,
        };
        let size = self.call_config.info_buffer_size;

        let result = self.invoke(
            function,
            &[
                literal_arg(&data),
                CallArg::OutBuffer(size),
                CallArg::Word(size as u64),
            ],
        )?;
        // info関数は書こうとした長さを返す
        if result.return_value >= size as u64 {
            warn!(
                "{}({}) output truncated: {} bytes for a {} byte buffer",
                function, data, result.return_value, size
            );
        }
        let buffer = result.out_buffers.first().map(Vec::as_slice).unwrap_or(&[]);
        let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
        Ok(String::from_utf8_lossy(&buffer[..end]).into_owned())
    }
}
