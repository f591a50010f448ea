//! 采样记录：字段向量（或按实体分组的字段向量）、差分与百分比换算、文本渲染

use crate::schema::{FieldDef, SEPARATOR, Schema};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;

/// 记录类型，对应输出行首的标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// 累计值 `a`
    Cumulative,
    /// 增量 `d`
    Delta,
    /// 增量百分比 `p`
    Percent,
}

impl RecordKind {
    #[inline]
    pub fn marker(self) -> &'static str {
        match self {
            RecordKind::Cumulative => "a",
            RecordKind::Delta => "d",
            RecordKind::Percent => "p",
        }
    }
}

/// 字段值：单一向量或按实体键分组
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Values {
    Flat(Vec<u64>),
    Keyed(BTreeMap<String, Vec<u64>>),
}

/// 一次采样的记录
#[derive(Debug, Clone)]
pub struct Record {
    pub time: DateTime<Local>,
    pub kind: RecordKind,
    pub values: Values,
}

impl Record {
    /// 按注册表分配一个全零记录
    pub fn new(schema: &Schema, kind: RecordKind) -> Self {
        let values = if schema.is_keyed() {
            Values::Keyed(BTreeMap::new())
        } else {
            Values::Flat(vec![0; schema.field_count()])
        };
        Self {
            time: Local::now(),
            kind,
            values,
        }
    }

    /// 单一向量的字段值
    #[inline]
    pub fn fields(&self) -> Option<&[u64]> {
        match &self.values {
            Values::Flat(fields) => Some(fields),
            Values::Keyed(_) => None,
        }
    }

    /// 某个实体的字段值
    #[inline]
    pub fn entity(&self, key: &str) -> Option<&[u64]> {
        match &self.values {
            Values::Keyed(map) => map.get(key).map(Vec::as_slice),
            Values::Flat(_) => None,
        }
    }

    /// 计算 `self - prev` 写入 `out`
    ///
    /// 累加器字段做无符号回绕减法：计数器被重置时结果会回绕成一个很大的数，
    /// 这里不做截断或修正。瞬时字段直接取当前值。多实体记录按键差分，新出现
    /// 的键以全零为基线，只存在于 `prev` 中的键不会出现在结果里。
    pub fn diff_into(&self, prev: &Record, schema: &Schema, out: &mut Record) {
        out.time = self.time;
        out.kind = RecordKind::Delta;

        match (&self.values, &prev.values, &mut out.values) {
            (Values::Flat(cur), Values::Flat(old), Values::Flat(delta)) => {
                diff_fields(schema.fields, cur, Some(old.as_slice()), delta);
            }
            (Values::Keyed(cur), Values::Keyed(old), Values::Keyed(delta)) => {
                let mut stale = std::mem::take(delta);
                for (key, fields) in cur {
                    let mut target = stale
                        .remove(key)
                        .unwrap_or_else(|| vec![0; schema.field_count()]);
                    diff_fields(
                        schema.fields,
                        fields,
                        old.get(key).map(Vec::as_slice),
                        &mut target,
                    );
                    delta.insert(key.clone(), target);
                }
            }
            // 同一注册表分配的记录形状一致
            _ => {}
        }
    }

    /// 将增量记录中参与总量的字段换算为百分比
    ///
    /// 总量增量为零时保持原值不变。注册表未定义百分比换算时不做任何处理，
    /// 记录仍为增量类型。
    pub fn relativize(&mut self, schema: &Schema) {
        let Some(rel) = schema.relative else {
            return;
        };
        if self.kind != RecordKind::Delta {
            return;
        }

        let apply = |fields: &mut [u64]| {
            let total = fields[rel.total];
            if total == 0 {
                return;
            }
            for &slot in rel.parts {
                fields[slot] = (u128::from(fields[slot]) * 100 / u128::from(total)) as u64;
            }
        };

        match &mut self.values {
            Values::Flat(fields) => apply(fields.as_mut_slice()),
            Values::Keyed(map) => map
                .values_mut()
                .for_each(|fields| apply(fields.as_mut_slice())),
        }
        self.kind = RecordKind::Percent;
    }
}

/// 逐字段差分，`old` 缺失时以零为基线
fn diff_fields(defs: &[FieldDef], cur: &[u64], old: Option<&[u64]>, out: &mut Vec<u64>) {
    out.clear();
    out.extend(cur.iter().enumerate().map(|(i, &value)| {
        if defs[i].accumulator {
            let base = old.map_or(0, |old| old[i]);
            value.wrapping_sub(base)
        } else {
            value
        }
    }));
}

fn write_fields(f: &mut fmt::Formatter<'_>, kind: RecordKind, fields: &[u64]) -> fmt::Result {
    f.write_str(kind.marker())?;
    for value in fields {
        write!(f, "{SEPARATOR}{value}")?;
    }
    Ok(())
}

/// 渲染为输出行；多实体记录每个实体一行，行首为实体键
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.values {
            Values::Flat(fields) => write_fields(f, self.kind, fields),
            Values::Keyed(map) => {
                for (i, (key, fields)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{key}{SEPARATOR}")?;
                    write_fields(f, self.kind, fields)?;
                }
                Ok(())
            }
        }
    }
}
