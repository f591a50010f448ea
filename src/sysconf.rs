use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use tokio::process::Command;

/// 默认的 getconf 命令
pub const DEFAULT_GETCONF: &str = "getconf";

/// 启动时解析一次的系统配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConf {
    /// 每秒时钟滴答数（USER_HZ）
    pub clk_tck: u64,
    /// 在线处理器数量
    pub nprocs: u64,
}

impl Default for SystemConf {
    #[inline]
    fn default() -> Self {
        Self {
            clk_tck: 100,
            nprocs: 1,
        }
    }
}

impl SystemConf {
    /// 通过 getconf 查询系统配置，失败时使用默认值并告警
    pub async fn resolve(getconf: &str) -> Self {
        let defaults = Self::default();

        let clk_tck = match getconf_u64(getconf, "CLK_TCK").await {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "无法从系统配置获取 CLK_TCK，使用默认值 ({}): {e:#}",
                    defaults.clk_tck
                );
                defaults.clk_tck
            }
        };

        let nprocs = match getconf_u64(getconf, "_NPROCESSORS_ONLN").await {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "无法从系统配置获取 _NPROCESSORS_ONLN，使用默认值 ({}): {e:#}",
                    defaults.nprocs
                );
                defaults.nprocs
            }
        };

        let conf = Self { clk_tck, nprocs };
        debug!("系统配置: {conf:?}");
        conf
    }

    /// 理论最大 CPU 时间（每秒滴答数 × 处理器数）
    #[inline]
    pub fn cpu_capacity(&self) -> u64 {
        self.clk_tck.wrapping_mul(self.nprocs)
    }
}

/// 运行 `getconf <name>` 并解析为无符号整数
async fn getconf_u64(getconf: &str, name: &str) -> Result<u64> {
    let output = Command::new(getconf)
        .arg(name)
        .output()
        .await
        .with_context(|| format!("无法执行 {getconf}"))?;

    if !output.status.success() {
        return Err(anyhow!("{getconf} {name} 退出状态: {}", output.status));
    }

    parse_getconf_output(&output.stdout).with_context(|| format!("{getconf} {name} 输出无效"))
}

#[inline]
fn parse_getconf_output(stdout: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(stdout)?;
    Ok(text.trim().parse::<u64>()?)
}
