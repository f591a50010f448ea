//! 轮询调度器
//!
//! 调度器独占两块预分配的记录缓冲区（当前、上一次），每次采样后交换角色。
//! 下一次采样的目标时间是上一次的目标时间加上间隔，而不是"现在"加上间隔，
//! 这样采样本身的耗时不会累积成漂移；目标时间已过时立即采样。

use crate::config::{Config, Mode};
use crate::error::{PollError, Result};
use crate::record::{Record, RecordKind};
use crate::schema::Schema;
use crate::source::Source;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// 轮询调度器
pub struct Poller<S: Source> {
    source: S,
    schema: &'static Schema,
    config: Config,
    /// 两块轮换使用的缓冲区，`current` 指向本次采样写入的那一块
    buffers: [Record; 2],
    current: usize,
    delta: Record,
    has_baseline: bool,
}

impl<S: Source> Poller<S> {
    /// 创建调度器并预分配缓冲区
    pub fn new(source: S, config: &Config) -> Self {
        let schema = source.schema();
        Self {
            source,
            schema,
            config: config.clone(),
            buffers: [
                Record::new(schema, RecordKind::Cumulative),
                Record::new(schema, RecordKind::Cumulative),
            ],
            current: 0,
            delta: Record::new(schema, RecordKind::Delta),
            has_baseline: false,
        }
    }

    /// 在后台任务中运行，返回任务句柄与记录接收端
    ///
    /// 通道容量为 1：消费者未取走上一条记录时，调度器会等待。
    pub fn spawn(self) -> (JoinHandle<()>, mpsc::Receiver<Record>) {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(self.run(tx));
        (handle, rx)
    }

    /// 运行轮询循环，结束时关闭通道
    pub async fn run(mut self, tx: mpsc::Sender<Record>) {
        let start = Instant::now();
        let mut target = start;
        let mut ticks: u64 = 0;

        info!(
            "{} 开始轮询，间隔 {:?}，时长 {:?}，模式 {:?}",
            self.schema.name, self.config.interval, self.config.duration, self.config.mode
        );

        loop {
            if ticks > 0 {
                target += self.config.interval;
                sleep_until(target).await;
            }
            if self.config.is_expired(start.elapsed()) {
                break;
            }
            ticks += 1;

            match self.tick().await {
                Ok(record) => {
                    if tx.send(record).await.is_err() {
                        debug!("接收端已关闭，停止轮询");
                        break;
                    }
                }
                Err(PollError::EndOfInput) => {
                    info!("{} 输入结束，停止轮询", self.schema.name);
                    break;
                }
                Err(e) => warn!("采样失败，忽略本次记录: {e}"),
            }
        }

        debug!("{} 轮询结束，共 {ticks} 次采样", self.schema.name);
        drop(tx);
    }

    /// 采样一次并生成要输出的记录
    ///
    /// 第一次成功采样总是输出累计值。采样失败时上一次的基线保持不变。
    pub async fn tick(&mut self) -> Result<Record> {
        let [first, second] = &mut self.buffers;
        let (current, previous) = if self.current == 0 {
            (first, second)
        } else {
            (second, first)
        };

        self.source.sample(current).await?;

        if self.config.mode == Mode::Cumulative {
            return Ok(current.clone());
        }

        let record = if self.has_baseline {
            current.diff_into(previous, self.schema, &mut self.delta);
            if self.config.mode == Mode::Percent {
                self.delta.relativize(self.schema);
            }
            self.delta.clone()
        } else {
            current.clone()
        };

        self.has_baseline = true;
        self.current ^= 1;
        Ok(record)
    }
}
