use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{
    CaptureSession, ExportOrder, Page, ProgressHook, Replay, SnapshotPage, SourceRegistry, utils,
};
use crate::config::{Config, init as logging};
use crate::event::{MutationBatch, SourceCaptured};

#[derive(Parser)]
#[command(name = "turntable-capture")]
#[command(about = "收集产品转盘查看器的全部图片地址", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 列出页面中匹配的目标元素
    ListTargets {
        /// 保存的页面 HTML
        #[arg(short, long)]
        page: PathBuf,

        /// 配置文件路径
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 覆盖配置中的选择器
        #[arg(long)]
        selector: Option<String>,
    },

    /// 采集图片地址并导出 JSON
    Capture {
        /// 保存的页面 HTML
        #[arg(short, long)]
        page: PathBuf,

        /// 变更记录文件（每行一个批次）
        #[arg(short, long)]
        mutations: Option<PathBuf>,

        /// 配置文件路径
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 导出顺序
        #[arg(short, long, value_enum)]
        ordering: Option<ExportOrder>,

        /// 输出紧凑 JSON
        #[arg(long)]
        compact: bool,

        /// 输出文件（默认标准输出）
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,

        /// 日志等级 (trace, debug, info, warn, error)
        #[arg(short, long)]
        log_level: Option<String>,
    },

    /// 对已导出的 JSON 数组重新排序
    Sort {
        /// 导出的 JSON 文件
        #[arg(short, long)]
        input: PathBuf,

        /// 导出顺序
        #[arg(short, long, value_enum, default_value_t = ExportOrder::NumericSuffix)]
        ordering: ExportOrder,

        /// 输出紧凑 JSON
        #[arg(long)]
        compact: bool,
    },
}

/// CLI 入口函数
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ListTargets {
            page,
            config,
            selector,
        } => {
            list_targets(page, config, selector)?;
        }
        Commands::Capture {
            page,
            mutations,
            config,
            ordering,
            compact,
            output,
            log_level,
        } => {
            start_capture(page, mutations, config, ordering, compact, output, log_level).await?;
        }
        Commands::Sort {
            input,
            ordering,
            compact,
        } => {
            sort_export(input, ordering, compact)?;
        }
    }

    Ok(())
}

fn load_page(path: &Path, config: &Config) -> Result<SnapshotPage> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read page {}", path.display()))?;
    Ok(SnapshotPage::parse(&html, &config.target.page_url)?)
}

/// 列出页面中匹配的目标元素
fn list_targets(page_path: PathBuf, config_path: Option<PathBuf>, selector: Option<String>) -> Result<()> {
    let config = Config::load_or_default(config_path.as_deref())?;
    let selector = selector.unwrap_or(config.target.selector.clone());
    let page = load_page(&page_path, &config)?;

    let targets = page.query_selector_all(&selector)?;
    println!("页面 {} 共 {} 个元素", page.base_url(), page.element_count());

    if targets.is_empty() {
        println!("未找到匹配 {} 的元素", selector);
    } else {
        println!("找到 {} 个目标元素:\n", targets.len());
        for (idx, element) in targets.iter().enumerate() {
            let source = page
                .resolved_source(*element, &config.target.attribute)
                .unwrap_or_else(|| "-".to_string());
            println!("  [{}] {} {}", idx + 1, page.describe(*element), source);
        }
    }

    Ok(())
}

fn progress_logger() -> ProgressHook {
    Box::new(|event: &SourceCaptured, registry: &SourceRegistry| {
        debug_assert_eq!(event.total, registry.len());
        info!(
            "[{}] {} from {} ({}) at {}",
            event.total,
            event.source,
            event.element,
            event.origin,
            event.timestamp.format("%H:%M:%S%.3f")
        );
        debug!("Registry: {:?}", registry.as_slice());
    })
}

/// 开始采集任务
#[allow(clippy::too_many_arguments)]
async fn start_capture(
    page_path: PathBuf,
    mutations: Option<PathBuf>,
    config_path: Option<PathBuf>,
    ordering: Option<ExportOrder>,
    compact: bool,
    output: Option<PathBuf>,
    log_level: Option<String>,
) -> Result<()> {
    // 加载配置
    let config = Config::load_or_default(config_path.as_deref())?;

    // 初始化日志
    logging::init(&config.logging, log_level.as_deref());
    info!("Target: {}", config.target);

    let ordering = ordering.unwrap_or(config.export.ordering);
    let pretty = config.export.pretty && !compact;

    let mut page = load_page(&page_path, &config)?;
    let mut session = CaptureSession::initialize(
        &page,
        &config.target.selector,
        &config.target.attribute,
        Some(progress_logger()),
    )?;
    info!("Watching {} targets", session.subscription_count());

    if let Some(mutations) = mutations {
        let cancel_token = CancellationToken::new();

        // Ctrl-C 停止回放，仍导出已采集的地址
        let ctrl_c_token = cancel_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, exporting what was captured so far");
                ctrl_c_token.cancel();
            }
        });

        let (tx, rx) = mpsc::channel::<MutationBatch>(100);
        let mut replay = Replay::new(mutations, cancel_token.clone());
        replay.start(tx);

        session.run(&mut page, rx, cancel_token.clone()).await;
        cancel_token.cancel();
        // 回放失败不影响导出
        match replay.finish().await {
            Ok(sent) => info!("Replayed {} batches", sent),
            Err(e) => warn!("Replay ended early: {:#}", e),
        }
    }

    if session.registry().is_empty() {
        warn!("No sources captured on `{}`", session.selector());
    }
    let json = session.export_json(ordering, pretty)?;
    info!(
        "Captured {} unique {} values on `{}`, exporting with ordering {}",
        session.registry().len(),
        session.attribute(),
        session.selector(),
        ordering
    );

    match output {
        Some(path) => {
            std::fs::write(&path, format!("{}\n", json))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("已导出到: {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// 对已导出的 JSON 数组重新排序
fn sort_export(input: PathBuf, ordering: ExportOrder, compact: bool) -> Result<()> {
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let sources: Vec<String> =
        serde_json::from_str(&content).context("Input must be a JSON array of strings")?;

    let sorted = utils::ordered(&sources, ordering);
    println!("{}", utils::to_json(&sorted, !compact)?);
    Ok(())
}
