//! 中继服务器配置
//!
//! 配置文件为 JSON，默认放在系统配置目录下，不存在时使用默认值。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use protocol::{DEFAULT_PORT, HANDSHAKE_TIMEOUT_SECS, MAX_CONNECTIONS};

/// 中继配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 监听地址
    pub bind: String,
    /// 同时在线的最大连接数
    pub max_peers: usize,
    /// 握手超时（秒）
    pub handshake_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", DEFAULT_PORT),
            max_peers: MAX_CONNECTIONS,
            handshake_timeout_secs: HANDSHAKE_TIMEOUT_SECS,
        }
    }
}

impl RelayConfig {
    /// 从文件加载，文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {:?}", path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {:?}", path))?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// 保存到文件
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("无法创建配置目录: {:?}", dir))?;
        }
        let content = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content).with_context(|| format!("写入文件失败: {:?}", path))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// 默认配置文件路径
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("无法获取系统配置目录")?;
    Ok(config_dir.join("chess-relay").join("relay.json"))
}
