use anyhow::Result;
use clap::Parser;
use log::{debug, warn};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use proxy_finder::ui::progress::ProgressTracker;
use proxy_finder::{
    ActiveProxy, Config, HttpDirectory, HttpProber, ProbeOutcome, ProxyCandidate, ProxyInstaller,
    SelectionOptions, SelectionOrchestrator, SelectionReport, SelectionResult,
};

/// 代理发现与设置工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short = 'f', long, default_value = "config/config.yaml")]
    config: String,

    /// 目录服务地址
    #[arg(long)]
    directory_url: Option<String>,

    /// 目录返回条数
    #[arg(long)]
    limit: Option<u32>,

    /// 探测地址
    #[arg(long)]
    probe_url: Option<String>,

    /// 探测超时时间（毫秒）
    #[arg(long)]
    timeout: Option<u64>,

    /// 最多探测的候选数量，0 表示不限
    #[arg(long)]
    max_attempts: Option<usize>,

    /// 全部失败时保留最后尝试的代理
    #[arg(long)]
    keep_on_failure: bool,

    /// 是否显示进度条
    #[arg(long)]
    progress: Option<bool>,

    /// 把运行报告写入 JSON 文件
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// 手动指定代理（host:port），跳过目录服务
    #[arg(short = 'p', long)]
    proxy: Option<String>,

    /// 手动指定时先验证再保留
    #[arg(long, requires = "proxy")]
    verify: bool,

    /// 日志级别（默认取配置文件）
    #[arg(long)]
    log_level: Option<String>,

    /// 详细输出
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Config {
    let mut config = if Path::new(&args.config).exists() {
        println!("📁 从配置文件加载设置: {}", args.config);
        match Config::load_from_file(&args.config) {
            Ok(config) => config,
            Err(e) => {
                println!("⚠️  配置文件加载失败: {}", e);
                println!("📝 使用默认配置");
                Config::default()
            }
        }
    } else {
        println!("📝 使用默认配置 (配置文件不存在: {})", args.config);
        Config::default()
    };

    // 覆盖命令行参数
    if let Some(url) = &args.directory_url {
        config.directory.url = url.clone();
    }
    if let Some(limit) = args.limit {
        config.directory.limit = limit;
    }
    if let Some(probe_url) = &args.probe_url {
        config.probe_url = probe_url.clone();
    }
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if args.keep_on_failure {
        config.clear_on_exhaustion = false;
    }
    if let Some(progress) = args.progress {
        config.print_progress = progress;
    }
    if let Some(output) = &args.output {
        config.output_file = Some(output.clone());
    }
    if args.verbose {
        config.log_level = "debug".to_string();
    } else if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    config
}

fn print_report(report: &SelectionReport) {
    if !report.attempts.is_empty() {
        println!("\n探测记录:");
        println!("{:=<60}", "");
        for (i, attempt) in report.attempts.iter().enumerate() {
            match &attempt.outcome {
                ProbeOutcome::Success => println!(
                    "{}. {}: ✅ 可用 ({}ms)",
                    i + 1,
                    attempt.candidate,
                    attempt.elapsed_ms
                ),
                ProbeOutcome::Failure(reason) => println!(
                    "{}. {}: ❌ {} ({}ms)",
                    i + 1,
                    attempt.candidate,
                    reason,
                    attempt.elapsed_ms
                ),
            }
        }
        println!("{:-<60}", "");
    }

    let icon = if report.result.is_selected() { "🎉" } else { "⚠️ " };
    println!("\n{} {}", icon, report.result.message());
    if let Some(candidate) = report.result.selected() {
        println!("   代理地址: {}", candidate.to_proxy_url());
    }
}

/// 经已安装的代理请求一次探测地址，显示出口 IP
async fn show_exit_ip(config: &Config) {
    let client = match ActiveProxy::global()
        .client_builder(config.get_timeout_duration())
        .and_then(|builder| builder.build().map_err(Into::into))
    {
        Ok(client) => client,
        Err(e) => {
            warn!("创建 HTTP 客户端失败: {}", e);
            return;
        }
    };

    let body = match client.get(&config.probe_url).send().await {
        Ok(response) => response.json::<serde_json::Value>().await,
        Err(e) => {
            debug!("获取出口 IP 失败: {}", e);
            return;
        }
    };
    if let Some(ip) = body.ok().as_ref().and_then(|v| v.get("ip")).and_then(|v| v.as_str()) {
        println!("   出口 IP: {}", ip);
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 解析命令行参数
    let args = Args::parse();
    let config = load_config(&args);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    println!("🚀 代理发现工具 v{}", env!("CARGO_PKG_VERSION"));
    println!("{:=<60}", "");

    config.validate()?;

    let directory = HttpDirectory::from_config(&config.directory)?;
    println!("\n⚙️  当前配置:");
    println!("  目录服务: {}", directory.url());
    println!("  探测地址: {}", config.probe_url);
    println!("  超时时间: {}ms", config.timeout);
    println!(
        "  失败时清除代理: {}",
        if config.clear_on_exhaustion { "✅" } else { "❌" }
    );

    let installer: &'static ActiveProxy = ActiveProxy::global();
    let orchestrator = SelectionOrchestrator::new(
        Arc::new(directory),
        Arc::new(HttpProber::new()),
        Arc::new(installer),
        SelectionOptions::from_config(&config),
    )
    .with_progress(ProgressTracker::new(config.print_progress));

    let report = match &args.proxy {
        Some(text) => match text.parse::<ProxyCandidate>() {
            Ok(candidate) => {
                println!("\n🔧 手动设置代理 {}", candidate);
                orchestrator.apply_manual(candidate, args.verify).await
            }
            Err(e) => {
                println!("❌ 输入无效: {}（示例: 127.0.0.1:8080）", e);
                return Ok(ExitCode::from(2));
            }
        },
        None => {
            println!("\n📡 查找可用代理...");
            orchestrator.select_and_apply().await
        }
    };

    print_report(&report);
    if report.result.is_selected() {
        show_exit_ip(&config).await;
    }

    if let Some(path) = &config.output_file {
        match report.save_to_file(path) {
            Ok(()) => println!("\n💾 运行报告已保存到: {}", path),
            Err(e) => warn!("保存运行报告失败: {}", e),
        }
    }

    debug!("当前代理: {:?}", installer.current());

    Ok(match report.result {
        SelectionResult::Selected(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
