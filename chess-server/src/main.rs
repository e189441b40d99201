use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chess_server::{default_config_path, Relay, RelayConfig};

#[derive(Parser)]
#[command(name = "chess-server")]
#[command(about = "Chess relay server", long_about = None)]
struct Cli {
    /// 监听地址，覆盖配置文件
    #[arg(long)]
    bind: Option<String>,

    /// 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,

    /// 最大连接数，覆盖配置文件
    #[arg(long)]
    max_peers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("chess_server=info".parse()?))
        .init();

    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = RelayConfig::load(&path)?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(max_peers) = cli.max_peers {
        config.max_peers = max_peers;
    }

    info!("国际象棋中继服务端启动中...");
    let relay = Relay::bind(config).await?;
    info!(addr = ?relay.local_addr(), "relay ready");

    relay.run().await?;
    Ok(())
}
