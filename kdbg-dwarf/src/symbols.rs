//! シンボル解決機能

use crate::{DwarfLoader, Result};
use object::{Object, ObjectSymbol, SymbolKind};
use std::collections::HashMap;

/// シンボル情報
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub is_function: bool,
}

/// シンボル解決
pub struct SymbolResolver {
    symbols_by_name: HashMap<String, Symbol>,
    /// アドレス順にソート済み
    symbols_by_address: Vec<Symbol>,
    is_pie: bool,
}

impl SymbolResolver {
    /// ELFのシンボルテーブルから作成する
    pub fn new(loader: &DwarfLoader) -> Result<Self> {
        let mut symbols_by_name = HashMap::new();
        let mut symbols_by_address = Vec::new();

        for symbol in loader.object_file().symbols() {
            let Ok(name) = symbol.name() else {
                continue;
            };
            if name.is_empty() || symbol.is_undefined() {
                continue;
            }

            let sym = Symbol {
                name: name.to_string(),
                address: symbol.address(),
                size: symbol.size(),
                is_function: symbol.kind() == SymbolKind::Text,
            };

            // 同名のローカルシンボルよりグローバルシンボルを優先する
            if symbol.is_global() || !symbols_by_name.contains_key(name) {
                symbols_by_name.insert(name.to_string(), sym.clone());
            }
            symbols_by_address.push(sym);
        }

        symbols_by_address.sort_by_key(|s| s.address);

        Ok(Self {
            symbols_by_name,
            symbols_by_address,
            is_pie: loader.is_pie(),
        })
    }

    /// PIEかどうか
    pub fn is_pie(&self) -> bool {
        self.is_pie
    }

    /// シンボル名からアドレスを解決する（ロードバイアス適用前）
    pub fn resolve(&self, symbol: &str) -> Option<u64> {
        self.symbols_by_name.get(symbol).map(|s| s.address)
    }

    /// アドレスを含む（または直前の）シンボルを返す
    pub fn reverse_resolve(&self, addr: u64) -> Option<Symbol> {
        match self.symbols_by_address.binary_search_by_key(&addr, |s| s.address) {
            Ok(idx) => Some(self.symbols_by_address[idx].clone()),
            Err(0) => None,
            Err(idx) => {
                let sym = &self.symbols_by_address[idx - 1];
                if sym.size == 0 || addr < sym.address + sym.size {
                    Some(sym.clone())
                } else {
                    None
                }
            }
        }
    }

    /// 指定した接頭辞で始まる関数シンボル名を昇順で返す
    pub fn function_names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .symbols_by_name
            .values()
            .filter(|s| s.is_function && s.name.starts_with(prefix))
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names
    }
}
