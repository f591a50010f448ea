//! 伪文件轮询采样库
//!
//! 按字段注册表周期性读取 `/proc` 伪文件（或文本流），输出累计值、增量或
//! 百分比记录。cpustat、vmstat、netstat、linescount 四个工具共用同一套
//! 解析、差分与调度逻辑，只是注册表不同。

pub mod config;
pub mod error;
pub mod lines;
pub mod poller;
pub mod record;
pub mod schema;
pub mod schemas;
pub mod source;
pub mod sysconf;

// 重新导出主要的公共类型
pub use config::{Config, Mode};
pub use error::{PollError, Result};
pub use lines::{LineFilter, LineSource};
pub use poller::Poller;
pub use record::{Record, RecordKind, Values};
pub use schema::{Header, Schema};
pub use schemas::{CPU_STAT, LINES_COUNT, NET_DEV, VM_STAT};
pub use source::{ProcSource, Source, apply_derived, parse_snapshot};
pub use sysconf::SystemConf;
