//! 国际象棋中继服务端
//!
//! 包含:
//! - 中继配置
//! - 按到达顺序配对并校验转发的中继服务器

pub mod config;
pub mod relay;

pub use config::{default_config_path, RelayConfig};
pub use relay::{MatchOutcome, PeerCount, Relay};
