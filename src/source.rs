//! 数据源与快照解析
//!
//! 伪文件每次采样都重新读取：它们反映的是内核的实时视图，文件很小，
//! 一次读完即可，不保留打开的句柄。

use crate::config::Config;
use crate::error::{PollError, Result};
use crate::record::{Record, Values};
use crate::schema::{Layout, LineDef, Schema};
use crate::sysconf::SystemConf;
use chrono::Local;
use log::trace;
use std::future::Future;
use std::path::{Path, PathBuf};

/// 调度器驱动的数据源
pub trait Source: Send + 'static {
    /// 数据源对应的字段注册表
    fn schema(&self) -> &'static Schema;

    /// 采样一次，清零并重新填充 `record`
    fn sample(&mut self, record: &mut Record) -> impl Future<Output = Result<()>> + Send;
}

/// 伪文件数据源
#[derive(Debug, Clone)]
pub struct ProcSource {
    schema: &'static Schema,
    path: PathBuf,
    sysconf: SystemConf,
}

impl ProcSource {
    /// 按配置中的根目录定位伪文件
    pub fn new(schema: &'static Schema, config: &Config) -> Self {
        Self {
            schema,
            path: config.source_path(schema),
            sysconf: config.sysconf,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for ProcSource {
    #[inline]
    fn schema(&self) -> &'static Schema {
        self.schema
    }

    async fn sample(&mut self, record: &mut Record) -> Result<()> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|error| PollError::SourceUnavailable {
                path: self.path.clone(),
                error,
            })?;

        record.time = Local::now();
        parse_snapshot(self.schema, &content, &mut record.values)?;
        apply_derived(self.schema, &self.sysconf, &mut record.values);
        Ok(())
    }
}

/// 解析一次快照的文本，覆盖 `values` 中的原始字段
///
/// 不认识的行直接跳过。字段数少于行定义时只填充已有的部分，兼容旧内核的
/// 较短格式。任何数值字段解析失败都会中止整个快照。
pub fn parse_snapshot(schema: &Schema, content: &str, values: &mut Values) -> Result<()> {
    match (schema.layout, values) {
        (Layout::Prefixed(_), Values::Flat(fields)) => {
            fields.clear();
            fields.resize(schema.field_count(), 0);
            for line in content.lines() {
                let mut tokens = line.split_whitespace();
                let Some(prefix) = tokens.next() else {
                    continue;
                };
                if let Some(def) = schema.line_def(prefix) {
                    fill_line(def, tokens, fields)?;
                }
            }
            Ok(())
        }
        (Layout::Keyed { separator, .. }, Values::Keyed(entities)) => {
            let mut stale = std::mem::take(entities);
            for line in content.lines() {
                let Some((key, glued, rest)) = split_entity(line, separator) else {
                    continue;
                };

                if !entities.contains_key(key) {
                    let mut fields = stale
                        .remove(key)
                        .unwrap_or_else(|| Vec::with_capacity(schema.field_count()));
                    fields.clear();
                    fields.resize(schema.field_count(), 0);
                    entities.insert(key.to_owned(), fields);
                }
                if let Some(fields) = entities.get_mut(key) {
                    let tokens = glued.split_whitespace().chain(rest.split_whitespace());
                    fill_entity(key, tokens, fields)?;
                }
            }
            Ok(())
        }
        // 文本流与布局不匹配的组合没有可解析的行
        _ => Ok(()),
    }
}

/// 取行首字段作为实体键，键必须以分隔符结尾
///
/// 旧内核会把第一个数值直接接在分隔符后面（`eth0:123`），这部分作为
/// `glued` 返回。行首字段不含分隔符的行（表头）返回 `None`。
fn split_entity(line: &str, separator: char) -> Option<(&str, &str, &str)> {
    let line = line.trim_start();
    let (token, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let (key, glued) = token.split_once(separator)?;
    if key.is_empty() {
        return None;
    }
    Some((key, glued, rest))
}

/// 按行定义把数值写入对应槽位
fn fill_line<'a>(
    def: &LineDef,
    tokens: impl Iterator<Item = &'a str>,
    fields: &mut [u64],
) -> Result<()> {
    let mut filled = 0;
    for (&slot, token) in def.slots.iter().zip(tokens) {
        fields[slot] = parse_token(def.prefix, token)?;
        filled += 1;
    }
    if filled < def.slots.len() {
        trace!(
            "'{}' 行只有 {filled} 个字段，期望 {} 个",
            def.prefix,
            def.slots.len()
        );
    }
    Ok(())
}

/// 多实体行的数值依次写入全部槽位
fn fill_entity<'a>(
    key: &str,
    tokens: impl Iterator<Item = &'a str>,
    fields: &mut [u64],
) -> Result<()> {
    let expected = fields.len();
    let mut filled = 0;
    for (slot, token) in fields.iter_mut().zip(tokens) {
        *slot = parse_token(key, token)?;
        filled += 1;
    }
    if filled < expected {
        trace!("'{key}' 行只有 {filled} 个字段，期望 {expected} 个");
    }
    Ok(())
}

#[inline]
fn parse_token(prefix: &str, token: &str) -> Result<u64> {
    token
        .parse::<u64>()
        .map_err(|error| PollError::MalformedField {
            prefix: prefix.to_owned(),
            token: token.to_owned(),
            error,
        })
}

/// 在原始字段全部填充后计算派生字段
pub fn apply_derived(schema: &Schema, sysconf: &SystemConf, values: &mut Values) {
    if schema.derived.is_empty() {
        return;
    }

    let apply = |fields: &mut Vec<u64>| {
        for derived in schema.derived {
            let value = (derived.calc)(fields, sysconf);
            fields[derived.slot] = value;
        }
    };

    match values {
        Values::Flat(fields) => apply(fields),
        Values::Keyed(entities) => entities.values_mut().for_each(apply),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::RecordKind;
    use crate::schemas::{CPU_STAT, NET_DEV, VM_STAT, cpu, net, vm};
    use std::collections::BTreeMap;

    pub(crate) const PROC_STAT: &str = "\
cpu  200 0 60 900 0 0 0 0 0 0
cpu0 100 0 30 450 0 0 0 0 0 0
cpu1 100 0 30 450 0 0 0 0 0 0
intr 12345 1 2 3 4 5
ctxt 67890
btime 1700000000
processes 4242
procs_running 3
procs_blocked 1
softirq 99 1 2 3
";

    pub(crate) const PROC_NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:    5000      50    0    0    0     0          0         0     5000      50    0    0    0     0       0          0
  eth0:    1000      10    0    0    0     0          0         0      400       4    0    0    0     0       0          0
";

    /// 在临时目录下创建一个伪文件根目录
    pub(crate) async fn fixture_root(name: &str, files: &[(&str, &str)]) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "swb-stat-poller-{}-{name}",
            std::process::id()
        ));
        for (relative, content) in files {
            let path = root.join(relative);
            tokio::fs::create_dir_all(path.parent().unwrap())
                .await
                .unwrap();
            tokio::fs::write(&path, content).await.unwrap();
        }
        root
    }

    fn entity_keys(entities: &BTreeMap<String, Vec<u64>>) -> Vec<&str> {
        entities.keys().map(String::as_str).collect()
    }

    fn parse_flat(schema: &'static Schema, content: &str) -> Result<Vec<u64>> {
        let mut values = Record::new(schema, RecordKind::Cumulative).values;
        parse_snapshot(schema, content, &mut values)?;
        apply_derived(schema, &SystemConf::default(), &mut values);
        match values {
            Values::Flat(fields) => Ok(fields),
            Values::Keyed(_) => unreachable!(),
        }
    }

    #[test]
    fn test_parse_cpu_stat() {
        let fields = parse_flat(&CPU_STAT, PROC_STAT).unwrap();
        assert_eq!(fields.len(), cpu::FIELD_COUNT);
        assert_eq!(fields[cpu::USER], 200);
        assert_eq!(fields[cpu::SYSTEM], 60);
        assert_eq!(fields[cpu::IDLE], 900);
        assert_eq!(fields[cpu::TOTAL], 1160);
        assert_eq!(fields[cpu::MAX], 100);
        assert_eq!(fields[cpu::INTR_TOTAL], 12345);
        assert_eq!(fields[cpu::CTXT_TOTAL], 67890);
        assert_eq!(fields[cpu::PROCS_FORKS], 4242);
        assert_eq!(fields[cpu::PROCS_RUNNING], 3);
        assert_eq!(fields[cpu::PROCS_BLOCKED], 1);
    }

    #[test]
    fn test_parse_vm_stat() {
        let fields = parse_flat(&VM_STAT, PROC_STAT).unwrap();
        assert_eq!(fields.len(), vm::FIELD_COUNT);
        assert_eq!(fields[vm::CPU_TOTAL], 1160);
        assert_eq!(fields[vm::CPU_FIRST], 200);
        assert_eq!(fields[vm::PROCS_FORKS], 4242);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let first = parse_flat(&CPU_STAT, PROC_STAT).unwrap();
        let second = parse_flat(&CPU_STAT, PROC_STAT).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_short_cpu_line() {
        // 旧内核只有四个 CPU 计数器
        let fields = parse_flat(&CPU_STAT, "cpu 10 20 30 40\n").unwrap();
        assert_eq!(fields[cpu::USER], 10);
        assert_eq!(fields[cpu::IDLE], 40);
        assert_eq!(fields[cpu::IOWAIT], 0);
        assert_eq!(fields[cpu::TOTAL], 100);
    }

    #[test]
    fn test_parse_malformed_field() {
        let err = parse_flat(&CPU_STAT, "cpu 10 x 30 40\n").unwrap_err();
        match err {
            PollError::MalformedField { prefix, token, .. } => {
                assert_eq!(prefix, "cpu");
                assert_eq!(token, "x");
            }
            other => panic!("应该是 MalformedField 错误: {other}"),
        }
    }

    #[test]
    fn test_parse_negative_is_malformed() {
        assert!(parse_flat(&CPU_STAT, "ctxt -1\n").is_err());
    }

    #[test]
    fn test_parse_ignores_unknown_and_blank_lines() {
        let fields = parse_flat(&CPU_STAT, "\n\nbogus line here\nctxt 5\n").unwrap();
        assert_eq!(fields[cpu::CTXT_TOTAL], 5);
        assert_eq!(fields[cpu::USER], 0);
    }

    #[test]
    fn test_parse_net_dev() {
        let mut values = Record::new(&NET_DEV, RecordKind::Cumulative).values;
        parse_snapshot(&NET_DEV, PROC_NET_DEV, &mut values).unwrap();
        let Values::Keyed(entities) = &values else {
            panic!("应该是多实体记录");
        };
        assert_eq!(entity_keys(entities), vec!["eth0", "lo"]);
        assert_eq!(entities["eth0"][net::RX_BYTES], 1000);
        assert_eq!(entities["eth0"][net::TX_BYTES], 400);
        assert_eq!(entities["lo"][net::TX_PACKETS], 50);
    }

    #[test]
    fn test_parse_net_dev_drops_absent_entities() {
        let mut values = Record::new(&NET_DEV, RecordKind::Cumulative).values;
        parse_snapshot(&NET_DEV, PROC_NET_DEV, &mut values).unwrap();
        parse_snapshot(&NET_DEV, "  eth0: 1500 12\n", &mut values).unwrap();

        let Values::Keyed(entities) = &values else {
            panic!("应该是多实体记录");
        };
        assert_eq!(entity_keys(entities), vec!["eth0"]);
        assert_eq!(entities["eth0"][net::RX_BYTES], 1500);
        assert_eq!(entities["eth0"][net::RX_PACKETS], 12);
        // 未出现的字段被清零
        assert_eq!(entities["eth0"][net::TX_BYTES], 0);
    }

    #[test]
    fn test_parse_keyed_takes_first_token_as_key() {
        let mut values = Record::new(&NET_DEV, RecordKind::Cumulative).values;
        let content = "foo bar:1 2\n  eth0:123 4 0 0 0 0 0 0 56 7\n: 9 9\n";
        parse_snapshot(&NET_DEV, content, &mut values).unwrap();

        let Values::Keyed(entities) = &values else {
            panic!("应该是多实体记录");
        };
        // 行首字段不带分隔符的行不是实体行
        assert_eq!(entity_keys(entities), vec!["eth0"]);
        assert_eq!(entities["eth0"][net::RX_BYTES], 123);
        assert_eq!(entities["eth0"][net::RX_PACKETS], 4);
        assert_eq!(entities["eth0"][net::TX_BYTES], 56);
        assert_eq!(entities["eth0"][net::TX_PACKETS], 7);
    }

    #[test]
    fn test_split_entity() {
        assert_eq!(split_entity("  lo: 1 2", ':'), Some(("lo", "", "1 2")));
        assert_eq!(split_entity("eth0:10 2", ':'), Some(("eth0", "10", "2")));
        assert_eq!(split_entity(" face |bytes", ':'), None);
        assert_eq!(split_entity("", ':'), None);
    }

    #[tokio::test]
    async fn test_proc_source_sample() {
        let root = fixture_root("proc-source", &[("proc/stat", PROC_STAT)]).await;
        let config = Config {
            fs_root: root,
            ..Config::default()
        };
        let mut source = ProcSource::new(&CPU_STAT, &config);
        assert!(source.path().ends_with("proc/stat"));

        let mut record = Record::new(&CPU_STAT, RecordKind::Cumulative);
        source.sample(&mut record).await.unwrap();
        assert_eq!(record.fields().unwrap()[cpu::TOTAL], 1160);
    }

    #[tokio::test]
    async fn test_proc_source_unavailable() {
        let config = Config {
            fs_root: PathBuf::from("/nonexistent/swb-stat-poller"),
            ..Config::default()
        };
        let mut source = ProcSource::new(&NET_DEV, &config);
        let mut record = Record::new(&NET_DEV, RecordKind::Cumulative);
        let err = source.sample(&mut record).await.unwrap_err();
        assert!(matches!(err, PollError::SourceUnavailable { .. }));
    }
}
