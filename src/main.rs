use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser, Subcommand};
use log::{debug, info};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use swb_stat_poller::sysconf::DEFAULT_GETCONF;
use swb_stat_poller::{
    CPU_STAT, Config, LineFilter, LineSource, Mode, NET_DEV, Poller, ProcSource, Record, Source,
    SystemConf, VM_STAT,
};

/// 时间列格式：RFC 3339，毫秒精度，数字时区偏移
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// 伪文件轮询采样工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 采样间隔 (支持 ms/s/m/h 后缀，纯数字为秒)
    #[arg(short, long, default_value = "1s", value_parser = parse_duration)]
    interval: Duration,

    /// 总时长，0 表示不限
    #[arg(short, long, default_value = "0", value_parser = parse_duration)]
    duration: Duration,

    /// 输出累计值而不是增量
    #[arg(long)]
    cumul: bool,

    /// 每行前加时间列
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    time: bool,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// 伪文件根目录
    #[arg(long, env = "FS_ROOT", default_value = "/")]
    fs_root: PathBuf,

    /// 查询系统参数的命令
    #[arg(long, env = "GETCONF_CMD", default_value = DEFAULT_GETCONF)]
    getconf: String,

    #[command(subcommand)]
    tool: Tool,
}

#[derive(Subcommand, Debug)]
enum Tool {
    /// CPU 时间与进程统计 (/proc/stat)
    Cpu {
        /// CPU 时间换算为百分比
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        rel: bool,
    },
    /// 系统整体统计 (/proc/stat)
    Vm {
        /// CPU 时间换算为百分比
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        rel: bool,
    },
    /// 网络接口收发统计 (/proc/net/dev)
    Net,
    /// 统计标准输入中匹配的行数
    Lines {
        /// 只统计包含该子串的行，为空时统计所有行
        #[arg(long, default_value = "")]
        substring: String,
        /// 反转匹配
        #[arg(long)]
        invert: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    init_logger(&args.log_level);

    run_detached(poll(args))?
}

/// 在新建的运行时上执行 `future`，返回后不等待仍在运行的阻塞任务
///
/// 标准输入的读取在阻塞线程上进行且无法取消；默认的运行时析构会一直等它
/// 读到下一行，时长用完后进程就退不出去。
fn run_detached<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("无法创建异步运行时")?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

async fn poll(args: Args) -> Result<()> {
    let rel = match args.tool {
        Tool::Cpu { rel } | Tool::Vm { rel } => rel,
        Tool::Net | Tool::Lines { .. } => false,
    };
    let config = Config {
        interval: args.interval,
        duration: args.duration,
        mode: Mode::from_flags(args.cumul, rel),
        fs_root: args.fs_root.clone(),
        sysconf: SystemConf::resolve(&args.getconf).await,
    };

    info!(
        "配置信息 - 间隔: {:?}, 时长: {:?}, 模式: {:?}, 根目录: {}",
        config.interval,
        config.duration,
        config.mode,
        config.fs_root.display()
    );
    debug!("系统参数: {:?}", config.sysconf);

    let out = &mut std::io::stdout().lock();
    match args.tool {
        Tool::Cpu { .. } => {
            run_tool(ProcSource::new(&CPU_STAT, &config), &config, args.time, out).await
        }
        Tool::Vm { .. } => {
            run_tool(ProcSource::new(&VM_STAT, &config), &config, args.time, out).await
        }
        Tool::Net => run_tool(ProcSource::new(&NET_DEV, &config), &config, args.time, out).await,
        Tool::Lines { substring, invert } => {
            let source = LineSource::spawn(tokio::io::stdin(), LineFilter::new(substring, invert));
            run_tool(source, &config, args.time, out).await
        }
    }
}

/// 输出表头，然后逐条输出记录直到调度器结束
async fn run_tool<S: Source>(
    source: S,
    config: &Config,
    with_time: bool,
    out: &mut impl Write,
) -> Result<()> {
    let schema = source.schema();
    let (handle, mut rx) = Poller::new(source, config).spawn();

    if with_time {
        write!(out, "time ")?;
    }
    writeln!(out, "{}", schema.header())?;
    out.flush()?;

    while let Some(record) = rx.recv().await {
        write_record(out, &record, with_time).context("写入标准输出失败")?;
        out.flush()?;
    }

    handle.await.context("轮询任务异常退出")?;
    info!("{} 正常结束", schema.name);
    Ok(())
}

/// 写出一条记录；多实体记录每行都带时间列，空记录不输出
fn write_record(out: &mut impl Write, record: &Record, with_time: bool) -> std::io::Result<()> {
    let text = record.to_string();
    if text.is_empty() {
        return Ok(());
    }
    let time = record.time.format(TIME_FORMAT);
    for line in text.lines() {
        if with_time {
            write!(out, "{time} ")?;
        }
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// 解析时长：`500ms`、`2s`、`5m`、`1h`，纯数字按秒计
fn parse_duration(text: &str) -> Result<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: u64 = number
        .parse()
        .with_context(|| format!("无效的时长: '{text}'"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(3600))),
        _ => Err(anyhow!("无效的时长单位: '{unit}'")),
    }
}

/// 初始化日志系统
fn init_logger(level: &str) {
    // 日志写到 stderr，stdout 只输出表头和记录
    match env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .try_init()
    {
        Ok(_) => info!("日志系统初始化成功，级别: {level}"),
        Err(e) => eprintln!("日志系统初始化失败: {e}，使用默认设置"),
    }
}
