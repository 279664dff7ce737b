//! グローバル変数の型検索

use crate::type_info::{get_type, TypeInfo, TypeInfoExtractor};
use crate::{DwarfLoader, Result};
use tracing::debug;

/// グローバル変数の型検索器
///
/// Cでは`extern`宣言（ヘッダ側）と定義（.c側）が別々のDIEになり、
/// 定義側は名前を持たずDW_AT_specificationで宣言を指すことがある。
/// 両方を候補として集め、配列長が確定している方を優先する。
pub struct GlobalTypeResolver<'a> {
    loader: &'a DwarfLoader,
}

impl<'a> GlobalTypeResolver<'a> {
    pub fn new(loader: &'a DwarfLoader) -> Self {
        Self { loader }
    }

    /// グローバル変数`name`の型を返す。見つからなければNone
    pub fn find(&self, name: &str) -> Result<Option<TypeInfo>> {
        let dwarf = self.loader.dwarf();
        let extractor = TypeInfoExtractor::new(dwarf);
        let mut fallback = None;

        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;
            let mut declarations = Vec::new();
            let mut entries = unit.entries();
            let mut depth = 0isize;

            while let Some((delta, entry)) = entries.next_dfs()? {
                depth += delta;
                // コンパイルユニット直下の変数のみ
                if depth != 1 || entry.tag() != gimli::DW_TAG_variable {
                    continue;
                }

                let named = extractor.get_name(&unit, entry).as_deref() == Some(name);
                let specifies = match entry.attr_value(gimli::DW_AT_specification)? {
                    Some(gimli::AttributeValue::UnitRef(offset)) => {
                        declarations.iter().any(|(decl, _)| *decl == offset)
                    }
                    _ => false,
                };
                if !named && !specifies {
                    continue;
                }

                let type_offset = get_type(entry).or_else(|| {
                    declarations
                        .iter()
                        .find_map(|(_, ty)| if specifies { *ty } else { None })
                });
                if named {
                    declarations.push((entry.offset(), get_type(entry)));
                }

                let Some(type_offset) = type_offset else {
                    continue;
                };
                let type_info = extractor.extract_type_info(&unit, type_offset)?;

                if is_complete(&type_info) {
                    debug!("global '{}' resolved to {}", name, type_info.type_name());
                    return Ok(Some(type_info));
                }
                fallback.get_or_insert(type_info);
            }
        }

        if let Some(type_info) = &fallback {
            debug!("global '{}' resolved to incomplete {}", name, type_info.type_name());
        }
        Ok(fallback)
    }
}

fn is_complete(type_info: &TypeInfo) -> bool {
    !matches!(
        type_info,
        TypeInfo::Array { length: None, .. } | TypeInfo::Unknown
    )
}
