//! DWARF型情報の抽出
//!
//! DWARF DIEから、グローバル変数をたどるのに必要な型情報
//! （サイズ、構造体メンバのオフセット、配列長、ポインタの参照先）を抽出します。
//! typedef / const / volatile は透過的にたどります。

use crate::Result;
use gimli::Reader;

/// ポインタの参照先をたどる深さの上限（自己参照構造体対策）
const MAX_TYPE_DEPTH: usize = 8;

/// 型情報
#[derive(Debug, Clone, PartialEq)]
pub enum TypeInfo {
    /// 基本型
    Primitive { name: String, size: u64 },
    /// ポインタ型
    Pointer {
        pointee_type: Option<Box<TypeInfo>>,
        size: u64,
    },
    /// 配列型
    Array {
        element_type: Option<Box<TypeInfo>>,
        length: Option<u64>,
    },
    /// 構造体型
    Struct {
        name: String,
        size: u64,
        fields: Vec<FieldInfo>,
    },
    /// Union型
    Union {
        name: String,
        size: u64,
        members: Vec<FieldInfo>,
    },
    /// 列挙型
    Enum { name: String, size: u64 },
    /// 不明な型
    Unknown,
}

/// フィールド情報
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    /// 構造体先頭からのオフセット（バイト）
    pub offset: u64,
    pub type_info: Option<Box<TypeInfo>>,
}

impl TypeInfo {
    /// 型のバイトサイズ（不明なら0）
    pub fn size(&self) -> u64 {
        match self {
            TypeInfo::Primitive { size, .. }
            | TypeInfo::Pointer { size, .. }
            | TypeInfo::Struct { size, .. }
            | TypeInfo::Union { size, .. }
            | TypeInfo::Enum { size, .. } => *size,
            TypeInfo::Array {
                element_type: Some(elem),
                length: Some(len),
            } => elem.size() * len,
            TypeInfo::Array { .. } | TypeInfo::Unknown => 0,
        }
    }

    /// 表示用の型名
    pub fn type_name(&self) -> String {
        match self {
            TypeInfo::Primitive { name, .. } => name.clone(),
            TypeInfo::Pointer { pointee_type, .. } => match pointee_type {
                Some(pointee) => format!("{} *", pointee.type_name()),
                None => "void *".to_string(),
            },
            TypeInfo::Array {
                element_type,
                length,
            } => {
                let elem = element_type
                    .as_ref()
                    .map(|t| t.type_name())
                    .unwrap_or_else(|| "?".to_string());
                match length {
                    Some(len) => format!("{}[{}]", elem, len),
                    None => format!("{}[]", elem),
                }
            }
            TypeInfo::Struct { name, .. } => format!("struct {}", name),
            TypeInfo::Union { name, .. } => format!("union {}", name),
            TypeInfo::Enum { name, .. } => format!("enum {}", name),
            TypeInfo::Unknown => "?".to_string(),
        }
    }

    /// `char *`（1バイト文字型へのポインタ）かどうか
    pub fn is_c_string(&self) -> bool {
        match self {
            TypeInfo::Pointer {
                pointee_type: Some(pointee),
                ..
            } => matches!(
                pointee.as_ref(),
                TypeInfo::Primitive { name, size: 1 } if name.contains("char")
            ),
            _ => false,
        }
    }

    /// 名前でフィールドを検索する（構造体とunion）
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        match self {
            TypeInfo::Struct { fields, .. } => fields.iter().find(|f| f.name == name),
            TypeInfo::Union { members, .. } => members.iter().find(|f| f.name == name),
            _ => None,
        }
    }
}

/// 型情報抽出器
pub struct TypeInfoExtractor<'a, R: Reader> {
    dwarf: &'a gimli::Dwarf<R>,
}

impl<'a, R: Reader<Offset = usize>> TypeInfoExtractor<'a, R> {
    /// 新しい型情報抽出器を作成する
    pub fn new(dwarf: &'a gimli::Dwarf<R>) -> Self {
        Self { dwarf }
    }

    /// 型DIEから型情報を抽出する
    pub fn extract_type_info(
        &self,
        unit: &gimli::Unit<R>,
        type_offset: gimli::UnitOffset<R::Offset>,
    ) -> Result<TypeInfo> {
        self.extract_at(unit, type_offset, 0)
    }

    fn extract_at(
        &self,
        unit: &gimli::Unit<R>,
        type_offset: gimli::UnitOffset<R::Offset>,
        depth: usize,
    ) -> Result<TypeInfo> {
        if depth > MAX_TYPE_DEPTH {
            return Ok(TypeInfo::Unknown);
        }

        let mut entries = unit.entries_at_offset(type_offset)?;
        match entries.next_dfs()? {
            Some((_, entry)) => self.extract_from_entry(unit, entry, depth),
            None => Ok(TypeInfo::Unknown),
        }
    }

    fn extract_from_entry(
        &self,
        unit: &gimli::Unit<R>,
        entry: &gimli::DebuggingInformationEntry<R>,
        depth: usize,
    ) -> Result<TypeInfo> {
        match entry.tag() {
            gimli::DW_TAG_base_type => Ok(TypeInfo::Primitive {
                name: self
                    .get_name(unit, entry)
                    .unwrap_or_else(|| "<unknown>".to_string()),
                size: get_byte_size(entry).unwrap_or(0),
            }),
            gimli::DW_TAG_pointer_type | gimli::DW_TAG_reference_type => Ok(TypeInfo::Pointer {
                pointee_type: self.referenced(unit, entry, depth + 1),
                size: get_byte_size(entry).unwrap_or(8),
            }),
            gimli::DW_TAG_typedef
            | gimli::DW_TAG_const_type
            | gimli::DW_TAG_volatile_type
            | gimli::DW_TAG_restrict_type => match get_type(entry) {
                Some(offset) => self.extract_at(unit, offset, depth),
                None => Ok(TypeInfo::Unknown),
            },
            gimli::DW_TAG_array_type => Ok(TypeInfo::Array {
                element_type: self.referenced(unit, entry, depth),
                length: self.array_length(unit, entry)?,
            }),
            gimli::DW_TAG_structure_type => Ok(TypeInfo::Struct {
                name: self
                    .get_name(unit, entry)
                    .unwrap_or_else(|| "<anonymous>".to_string()),
                size: get_byte_size(entry).unwrap_or(0),
                fields: self.extract_fields(unit, entry, depth)?,
            }),
            gimli::DW_TAG_union_type => Ok(TypeInfo::Union {
                name: self
                    .get_name(unit, entry)
                    .unwrap_or_else(|| "<anonymous>".to_string()),
                size: get_byte_size(entry).unwrap_or(0),
                members: self.extract_fields(unit, entry, depth)?,
            }),
            gimli::DW_TAG_enumeration_type => Ok(TypeInfo::Enum {
                name: self
                    .get_name(unit, entry)
                    .unwrap_or_else(|| "<anonymous>".to_string()),
                size: get_byte_size(entry).unwrap_or(4),
            }),
            _ => Ok(TypeInfo::Unknown),
        }
    }

    /// DW_AT_typeの参照先を抽出する（void等で参照がなければNone）
    fn referenced(
        &self,
        unit: &gimli::Unit<R>,
        entry: &gimli::DebuggingInformationEntry<R>,
        depth: usize,
    ) -> Option<Box<TypeInfo>> {
        let offset = get_type(entry)?;
        self.extract_at(unit, offset, depth).ok().map(Box::new)
    }

    /// 配列長をDW_TAG_subrange_typeから取得する
    fn array_length(
        &self,
        unit: &gimli::Unit<R>,
        entry: &gimli::DebuggingInformationEntry<R>,
    ) -> Result<Option<u64>> {
        let mut tree = unit.entries_tree(Some(entry.offset()))?;
        let root = tree.root()?;
        let mut children = root.children();

        while let Some(child) = children.next()? {
            let sub = child.entry();
            if sub.tag() != gimli::DW_TAG_subrange_type {
                continue;
            }
            if let Some(count) = sub
                .attr_value(gimli::DW_AT_count)?
                .and_then(|v| v.udata_value())
            {
                return Ok(Some(count));
            }
            if let Some(upper) = sub
                .attr_value(gimli::DW_AT_upper_bound)?
                .and_then(|v| v.udata_value())
            {
                return Ok(Some(upper + 1));
            }
            return Ok(None);
        }

        Ok(None)
    }

    fn extract_fields(
        &self,
        unit: &gimli::Unit<R>,
        parent_entry: &gimli::DebuggingInformationEntry<R>,
        depth: usize,
    ) -> Result<Vec<FieldInfo>> {
        let mut fields = Vec::new();
        let mut tree = unit.entries_tree(Some(parent_entry.offset()))?;
        let root = tree.root()?;

        let mut children = root.children();
        while let Some(child) = children.next()? {
            let entry = child.entry();
            if entry.tag() != gimli::DW_TAG_member {
                continue;
            }

            fields.push(FieldInfo {
                name: self
                    .get_name(unit, entry)
                    .unwrap_or_else(|| "<unnamed>".to_string()),
                offset: entry
                    .attr_value(gimli::DW_AT_data_member_location)?
                    .and_then(|v| v.udata_value())
                    .unwrap_or(0),
                type_info: self.referenced(unit, entry, depth + 1),
            });
        }

        Ok(fields)
    }

    /// DW_AT_nameを取得する（.debug_str参照も解決する）
    pub fn get_name(
        &self,
        unit: &gimli::Unit<R>,
        entry: &gimli::DebuggingInformationEntry<R>,
    ) -> Option<String> {
        let attr = entry.attr_value(gimli::DW_AT_name).ok()??;
        let name = self.dwarf.attr_string(unit, attr).ok()?;
        name.to_string_lossy().ok().map(|s| s.into_owned())
    }
}

fn get_byte_size<R: Reader>(entry: &gimli::DebuggingInformationEntry<R>) -> Option<u64> {
    entry
        .attr_value(gimli::DW_AT_byte_size)
        .ok()??
        .udata_value()
}

/// DW_AT_typeの参照先オフセット
pub(crate) fn get_type<R: Reader>(
    entry: &gimli::DebuggingInformationEntry<R>,
) -> Option<gimli::UnitOffset<R::Offset>> {
    match entry.attr_value(gimli::DW_AT_type).ok()?? {
        gimli::AttributeValue::UnitRef(offset) => Some(offset),
        _ => None,
    }
}
