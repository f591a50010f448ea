use crate::schema::Schema;
use crate::sysconf::SystemConf;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 输出模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 输出累计值
    Cumulative,
    /// 输出累加器的增量
    Delta,
    /// 输出增量，并将 CPU 计数器换算为百分比
    Percent,
}

impl Mode {
    /// 由命令行开关决定模式，`cumul` 优先于 `rel`
    #[inline]
    pub fn from_flags(cumul: bool, rel: bool) -> Self {
        match (cumul, rel) {
            (true, _) => Mode::Cumulative,
            (false, true) => Mode::Percent,
            (false, false) => Mode::Delta,
        }
    }
}

/// 轮询配置，启动时构造一次并传给数据源与调度器
#[derive(Debug, Clone)]
pub struct Config {
    /// 采样间隔
    pub interval: Duration,
    /// 总时长，零表示不限
    pub duration: Duration,
    pub mode: Mode,
    /// 伪文件根目录，用于离线测试或容器环境
    pub fs_root: PathBuf,
    pub sysconf: SystemConf,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            duration: Duration::ZERO,
            mode: Mode::Delta,
            fs_root: PathBuf::from("/"),
            sysconf: SystemConf::default(),
        }
    }
}

impl Config {
    /// 注册表对应的伪文件完整路径
    #[inline]
    pub fn source_path(&self, schema: &Schema) -> PathBuf {
        join_root(&self.fs_root, schema.path)
    }

    /// 时长是否已用完
    #[inline]
    pub fn is_expired(&self, elapsed: Duration) -> bool {
        !self.duration.is_zero() && elapsed > self.duration
    }
}

#[inline]
fn join_root(root: &Path, relative: &str) -> PathBuf {
    root.join(relative.trim_start_matches('/'))
}
