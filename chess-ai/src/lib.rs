//! 国际象棋 AI 引擎
//!
//! 包含:
//! - 棋局评估函数（子力、位置分、兵形、王的安全、机动性）
//! - Negamax + Alpha-Beta 搜索
//! - 置换表
//! - 可取消的后台搜索

mod evaluate;
mod search;
mod transposition;

pub use evaluate::{Evaluator, MOBILITY_WEIGHT};
pub use search::{AiConfig, AiEngine, CancelHandle, Difficulty, SearchTask, MATE_SCORE};
pub use transposition::{EntryType, TTEntry, TTStats, TranspositionTable};
