//! 字段与行的声明式注册表
//!
//! 每个工具用一个静态 [`Schema`] 描述：有哪些字段、哪些行前缀填充哪些槽位、
//! 哪些字段由其它字段派生、哪些字段可以换算成百分比。解析、差分、表头生成
//! 都只从这里获取字段信息。

use crate::sysconf::SystemConf;
use std::fmt;

/// 输出字段之间的分隔符
pub const SEPARATOR: &str = " ";

/// 字段定义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub category: &'static str,
    pub name: &'static str,
    /// 累加器（单调递增计数器）需要差分，瞬时值原样输出
    pub accumulator: bool,
}

impl FieldDef {
    /// 累加器字段
    pub const fn acc(category: &'static str, name: &'static str) -> Self {
        Self {
            category,
            name,
            accumulator: true,
        }
    }

    /// 瞬时值字段
    pub const fn inst(category: &'static str, name: &'static str) -> Self {
        Self {
            category,
            name,
            accumulator: false,
        }
    }
}

impl fmt::Display for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.accumulator { "a" } else { "i" };
        write!(f, "{}:{}/{kind}", self.category, self.name)
    }
}

/// 行定义：前缀之后的数值依次写入 `slots`
#[derive(Debug, Clone, Copy)]
pub struct LineDef {
    pub prefix: &'static str,
    pub slots: &'static [usize],
}

/// 派生字段的计算函数，输入为已填充的整行字段
pub type Calculator = fn(&[u64], &SystemConf) -> u64;

/// 派生字段：在原始字段全部填充后覆盖 `slot`
#[derive(Clone, Copy)]
pub struct Derived {
    pub slot: usize,
    pub calc: Calculator,
}

impl fmt::Debug for Derived {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived").field("slot", &self.slot).finish()
    }
}

/// 百分比换算定义：`parts` 中的字段换算为 `total` 的百分比
#[derive(Debug, Clone, Copy)]
pub struct RelativeDef {
    pub total: usize,
    pub parts: &'static [usize],
}

/// 数据源的行布局
#[derive(Debug, Clone, Copy)]
pub enum Layout {
    /// 以首个空白分隔的词作为前缀，按 [`LineDef`] 分派
    Prefixed(&'static [LineDef]),
    /// 多实体：`键<separator> 值...`，每个键一组字段，值依次写入全部槽位
    Keyed { separator: char, label: &'static str },
    /// 文本流，由 [`crate::lines::LineSource`] 直接填充
    Stream,
}

/// 一个工具的完整字段注册表
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    /// 相对于根目录的伪文件路径
    pub path: &'static str,
    pub fields: &'static [FieldDef],
    pub layout: Layout,
    pub derived: &'static [Derived],
    pub relative: Option<RelativeDef>,
}

impl Schema {
    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_keyed(&self) -> bool {
        matches!(self.layout, Layout::Keyed { .. })
    }

    /// 按前缀查找行定义，表项很少，线性扫描即可
    pub fn line_def(&self, prefix: &str) -> Option<&'static LineDef> {
        match self.layout {
            Layout::Prefixed(lines) => lines.iter().find(|def| def.prefix == prefix),
            _ => None,
        }
    }

    /// 表头
    #[inline]
    pub fn header(&'static self) -> Header {
        Header { schema: self }
    }

    /// 编译期校验槽位下标，配合 `const _: () = SCHEMA.validate();` 使用
    pub const fn validate(&self) {
        let count = self.fields.len();
        if let Layout::Prefixed(lines) = self.layout {
            let mut i = 0;
            while i < lines.len() {
                let mut j = 0;
                while j < lines[i].slots.len() {
                    assert!(lines[i].slots[j] < count, "行定义槽位越界");
                    j += 1;
                }
                i += 1;
            }
        }
        let mut i = 0;
        while i < self.derived.len() {
            assert!(self.derived[i].slot < count, "派生字段槽位越界");
            i += 1;
        }
        if let Some(rel) = self.relative {
            assert!(rel.total < count, "百分比总量槽位越界");
            let mut i = 0;
            while i < rel.parts.len() {
                assert!(rel.parts[i] < count, "百分比字段槽位越界");
                i += 1;
            }
        }
    }
}

/// 表头：标记 `h` 加上每个字段的表头文本
#[derive(Debug, Clone, Copy)]
pub struct Header {
    schema: &'static Schema,
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Layout::Keyed { label, .. } = self.schema.layout {
            write!(f, "{label}{SEPARATOR}")?;
        }
        f.write_str("h")?;
        for def in self.schema.fields {
            write!(f, "{SEPARATOR}{def}")?;
        }
        Ok(())
    }
}
