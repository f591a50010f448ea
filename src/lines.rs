//! 文本流行计数数据源
//!
//! 后台读取任务持续读取输入流并累计匹配行数，调度器每次采样只取当前总数。
//! 输入流结束且最终总数已经输出后，下一次采样返回 [`PollError::EndOfInput`]。

use crate::error::{PollError, Result};
use crate::record::{Record, Values};
use crate::schema::Schema;
use crate::schemas::{LINES_COUNT, lines};
use crate::source::Source;
use chrono::Local;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 行过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFilter {
    /// 为空时匹配所有行
    pub substring: String,
    /// 反转匹配：只统计不包含子串的行
    pub invert: bool,
}

impl LineFilter {
    pub fn new(substring: impl Into<String>, invert: bool) -> Self {
        Self {
            substring: substring.into(),
            invert,
        }
    }

    /// 按字节匹配，不要求输入为合法 UTF-8
    pub fn matches(&self, line: &[u8]) -> bool {
        let needle = self.substring.as_bytes();
        if needle.is_empty() {
            return true;
        }
        let contains = line.windows(needle.len()).any(|window| window == needle);
        contains != self.invert
    }
}

/// 文本流行计数数据源
#[derive(Debug)]
pub struct LineSource {
    tally: watch::Receiver<u64>,
    reported: Option<u64>,
    reader: JoinHandle<()>,
}

impl LineSource {
    /// 启动后台读取任务
    pub fn spawn<R>(input: R, filter: LineFilter) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, tally) = watch::channel(0u64);
        let reader = tokio::spawn(count_lines(input, filter, tx));
        Self {
            tally,
            reported: None,
            reader,
        }
    }
}

impl Drop for LineSource {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Source for LineSource {
    #[inline]
    fn schema(&self) -> &'static Schema {
        &LINES_COUNT
    }

    async fn sample(&mut self, record: &mut Record) -> Result<()> {
        // 先判断是否关闭再读取总数，保证读到的是最终值
        let closed = self.tally.has_changed().is_err();
        let total = *self.tally.borrow_and_update();
        if closed && self.reported == Some(total) {
            return Err(PollError::EndOfInput);
        }

        record.time = Local::now();
        if let Values::Flat(fields) = &mut record.values {
            fields.fill(0);
            fields[lines::COUNT] = total;
        }
        self.reported = Some(total);
        Ok(())
    }
}

/// 读取输入流直到结束，累计匹配行数
async fn count_lines<R>(input: R, filter: LineFilter, tally: watch::Sender<u64>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(input);
    let mut line = Vec::with_capacity(256);
    let mut total = 0u64;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                debug!("输入流结束，共 {total} 行匹配");
                break;
            }
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                }
                if filter.matches(&line) {
                    total += 1;
                    tally.send_replace(total);
                }
            }
            Err(e) => {
                warn!("读取输入流失败，停止计数: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKind;
    use tokio::io::AsyncWriteExt;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_line_filter_matches() {
        let any = LineFilter::default();
        assert!(any.matches(b"whatever"));
        assert!(any.matches(b""));

        let errors = LineFilter::new("ERROR", false);
        assert!(errors.matches(b"12:00 ERROR disk full"));
        assert!(!errors.matches(b"12:00 INFO ok"));

        let inverted = LineFilter::new("ERROR", true);
        assert!(!inverted.matches(b"12:00 ERROR disk full"));
        assert!(inverted.matches(b"12:00 INFO ok"));
    }

    #[test]
    fn test_line_filter_empty_substring_ignores_invert() {
        let filter = LineFilter::new("", true);
        assert!(filter.matches(b"anything"));
    }

    #[test]
    fn test_line_filter_non_utf8() {
        let filter = LineFilter::new("ERR", false);
        assert!(filter.matches(&[0xff, 0xfe, b'E', b'R', b'R']));
    }

    #[tokio::test]
    async fn test_line_source_counts_until_end() {
        let input: &[u8] = b"ERROR a\nINFO b\nERROR c\r\nWARN d\nERROR e";
        let mut source = LineSource::spawn(input, LineFilter::new("ERROR", false));
        let mut record = Record::new(&LINES_COUNT, RecordKind::Cumulative);

        // 等待读取任务处理完整个输入
        let mut tally = source.tally.clone();
        while tally.has_changed().is_ok() {
            let _ = tally.changed().await;
        }

        assert_ok!(source.sample(&mut record).await);
        assert_eq!(record.fields().unwrap()[lines::COUNT], 3);

        let err = assert_err!(source.sample(&mut record).await);
        assert!(matches!(err, PollError::EndOfInput));
    }

    #[tokio::test]
    async fn test_line_source_open_stream() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut source = LineSource::spawn(reader, LineFilter::default());
        let mut record = Record::new(&LINES_COUNT, RecordKind::Cumulative);

        assert_ok!(source.sample(&mut record).await);
        assert_eq!(record.fields().unwrap()[lines::COUNT], 0);
        // 流未关闭时总数不变也不算结束
        assert_ok!(source.sample(&mut record).await);

        writer.write_all(b"one\ntwo\n").await.unwrap();
        let mut tally = source.tally.clone();
        while *tally.borrow_and_update() < 2 {
            tally.changed().await.unwrap();
        }
        assert_ok!(source.sample(&mut record).await);
        assert_eq!(record.fields().unwrap()[lines::COUNT], 2);
    }
}
