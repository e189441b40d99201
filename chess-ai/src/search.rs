//! 搜索引擎
//!
//! Negamax + Alpha-Beta 剪枝，配合置换表。整棵树在同一个工作副本上通过 apply / revert 展开，
//! 根节点按生成顺序搜索，分数相同时保留先出现的走法。置换表在每次搜索开始时清空，
//! 同一局面的结果完全确定。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use protocol::{BoardState, Color, GameClassifier, Move, MoveGenerator, FIFTY_MOVE_LIMIT};
use serde::{Deserialize, Serialize};

use crate::evaluate::Evaluator;
use crate::transposition::{EntryType, TTStats, TranspositionTable};

/// 将死分值，实际分值会按距根节点的层数递减
pub const MATE_SCORE: i32 = 100_000;

const INFINITY: i32 = MATE_SCORE + 1;

/// 超过此值的分数是将死分
const MATE_BOUND: i32 = MATE_SCORE - 1000;

/// 将死分存入置换表时改为相对本节点的距离
fn score_to_table(score: i32, ply: i32) -> i32 {
    if score > MATE_BOUND {
        score + ply
    } else if score < -MATE_BOUND {
        score - ply
    } else {
        score
    }
}

fn score_from_table(score: i32, ply: i32) -> i32 {
    if score > MATE_BOUND {
        score - ply
    } else if score < -MATE_BOUND {
        score + ply
    } else {
        score
    }
}

/// AI 难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// 难度对应的搜索深度
    pub fn depth(&self) -> u8 {
        match self {
            Difficulty::Easy => 2,
            Difficulty::Medium => 3,
            Difficulty::Hard => 4,
        }
    }
}

/// AI 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub difficulty: Difficulty,
    pub max_depth: u8,
    /// 置换表大小（MB）
    #[serde(default = "default_tt_size")]
    pub tt_size_mb: usize,
}

fn default_tt_size() -> usize {
    16
}

impl AiConfig {
    pub fn from_difficulty(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            max_depth: difficulty.depth(),
            tt_size_mb: default_tt_size(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self::from_difficulty(Difficulty::Medium)
    }
}

/// 取消搜索的句柄，可以跨线程共享
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// AI 引擎
pub struct AiEngine {
    config: AiConfig,
    cancel: CancelHandle,
    tt: TranspositionTable,
    nodes_searched: u64,
}

impl AiEngine {
    /// 创建新的 AI 引擎
    pub fn new(config: AiConfig) -> Self {
        let tt = TranspositionTable::new(config.tt_size_mb);
        Self {
            config,
            cancel: CancelHandle::default(),
            tt,
            nodes_searched: 0,
        }
    }

    /// 从难度创建
    pub fn from_difficulty(difficulty: Difficulty) -> Self {
        Self::new(AiConfig::from_difficulty(difficulty))
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// 取消句柄；取消后的搜索返回 None
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// 按配置深度搜索最佳走法
    pub fn search(&mut self, state: &BoardState) -> Option<Move> {
        self.best_move(state, self.config.max_depth)
    }

    /// 搜索指定深度的最佳走法
    ///
    /// 没有合法走法或搜索被取消时返回 None。
    pub fn best_move(&mut self, state: &BoardState, depth: u8) -> Option<Move> {
        let started = Instant::now();
        let depth = depth.max(1);

        let (mv, score) = self.search_root(state, depth)?;
        let stats = self.tt.stats();
        tracing::debug!(
            depth,
            nodes = self.nodes_searched,
            score,
            best = %mv,
            tt_hits = stats.hits,
            tt_used = stats.used,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );
        Some(mv)
    }

    /// 根节点搜索，返回最佳走法和它的分数
    fn search_root(&mut self, state: &BoardState, depth: u8) -> Option<(Move, i32)> {
        self.nodes_searched = 0;
        self.tt.clear();

        let moves = MoveGenerator::generate_legal(state);
        if moves.is_empty() {
            return None;
        }

        let mut work = state.clone();
        let mut best: Option<(Move, i32)> = None;
        let mut alpha = -INFINITY;

        for mv in &moves {
            if self.cancel.is_cancelled() {
                break;
            }

            let undo = work.apply(mv).ok()?;
            let score = -self.negamax(&mut work, depth - 1, 1, -INFINITY, -alpha);
            work.revert(mv, undo);

            // 严格大于：分数相同时保留先生成的走法
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((*mv, score));
            }
            alpha = alpha.max(score);
        }

        if self.cancel.is_cancelled() {
            tracing::debug!(nodes = self.nodes_searched, "search cancelled");
            return None;
        }
        best
    }

    /// Negamax 搜索，返回走子方视角的分数
    fn negamax(
        &mut self,
        work: &mut BoardState,
        depth: u8,
        ply: i32,
        mut alpha: i32,
        beta: i32,
    ) -> i32 {
        self.nodes_searched += 1;

        // 指纹不含半回合计数，五十步已到的局面不查表也不入表
        let hash = work.fingerprint();
        let use_tt = work.halfmove_clock < FIFTY_MOVE_LIMIT;
        let cached = if use_tt { self.tt.lookup(hash) } else { None };
        if let Some(entry) = cached.filter(|e| e.depth >= depth) {
            let score = score_from_table(entry.score, ply);
            let usable = match entry.entry_type {
                EntryType::Exact => true,
                EntryType::LowerBound => score >= beta,
                EntryType::UpperBound => score <= alpha,
            };
            if usable {
                return score;
            }
        }

        // 终局判定先于深度判定
        let mut moves = MoveGenerator::generate_legal(work);
        if moves.is_empty() {
            let score = if MoveGenerator::is_in_check(&work.board, work.side_to_move) {
                // 被将死，越早越差
                -(MATE_SCORE - ply)
            } else {
                0
            };
            if use_tt {
                self.tt.store(hash, score_to_table(score, ply), u8::MAX, EntryType::Exact, None);
            }
            return score;
        }
        if work.halfmove_clock >= FIFTY_MOVE_LIMIT
            || GameClassifier::insufficient_material(&work.board)
        {
            return 0;
        }

        if depth == 0 {
            let score = self.evaluate(work);
            self.tt.store(hash, score, 0, EntryType::Exact, None);
            return score;
        }

        // 置换表中的最佳走法先搜
        if let Some(entry) = cached {
            if let Some(pos) = moves.iter().position(|m| entry.is_best(m)) {
                moves[..=pos].rotate_right(1);
            }
        }

        let alpha_orig = alpha;
        let mut best = -INFINITY;
        let mut best_move = None;
        for mv in &moves {
            if self.cancel.is_cancelled() {
                return best; // 不完整的结果不入表
            }

            let undo = match work.apply(mv) {
                Ok(undo) => undo,
                Err(_) => continue,
            };
            let score = -self.negamax(work, depth - 1, ply + 1, -beta, -alpha);
            work.revert(mv, undo);

            if score > best {
                best = score;
                best_move = Some(*mv);
            }
            if best > alpha {
                alpha = best;
            }
            if alpha >= beta {
                break; // Beta 剪枝
            }
        }

        let entry_type = if best <= alpha_orig {
            EntryType::UpperBound
        } else if best >= beta {
            EntryType::LowerBound
        } else {
            EntryType::Exact
        };
        if use_tt {
            self.tt.store(hash, score_to_table(best, ply), depth, entry_type, best_move.as_ref());
        }

        best
    }

    /// 评估当前局面
    fn evaluate(&self, state: &BoardState) -> i32 {
        let score = Evaluator::evaluate(state);
        // 根据当前走子方调整符号
        match state.side_to_move {
            Color::White => score,
            Color::Black => -score,
        }
    }

    /// 获取搜索的节点数
    pub fn nodes_searched(&self) -> u64 {
        self.nodes_searched
    }

    /// 最近一次搜索的置换表统计
    pub fn tt_stats(&self) -> TTStats {
        self.tt.stats()
    }
}

/// 在后台线程上运行的一次搜索
pub struct SearchTask {
    cancel: CancelHandle,
    handle: JoinHandle<Option<Move>>,
}

impl SearchTask {
    /// 在独立的局面副本上开始搜索
    pub fn spawn(config: AiConfig, state: BoardState) -> Self {
        let mut engine = AiEngine::new(config);
        let cancel = engine.cancel_handle();
        Self::start(cancel, move || engine.search(&state))
    }

    fn start<F>(cancel: CancelHandle, search: F) -> Self
    where
        F: FnOnce() -> Option<Move> + Send + 'static,
    {
        Self {
            cancel,
            handle: std::thread::spawn(search),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 等待搜索结束；搜索线程 panic 时返回 Err，由调用方决定如何处理
    pub fn join(self) -> std::thread::Result<Option<Move>> {
        self.handle.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Fen;

    fn best(fen: &str, depth: u8) -> Option<String> {
        let state = Fen::parse(fen).unwrap();
        let mut engine = AiEngine::from_difficulty(Difficulty::Easy);
        engine.best_move(&state, depth).map(|m| m.to_string())
    }

    #[test]
    fn test_search_initial_position() {
        let state = BoardState::initial();
        let mut engine = AiEngine::from_difficulty(Difficulty::Easy);

        let mv = engine.search(&state).unwrap();
        assert!(MoveGenerator::generate_legal(&state).contains(&mv));
        assert!(engine.nodes_searched() > 20);
    }

    #[test]
    fn test_finds_back_rank_mate() {
        assert_eq!(best("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1", 2).as_deref(), Some("a1a8"));
    }

    #[test]
    fn test_black_finds_mate() {
        assert_eq!(best("r5k1/8/8/8/8/8/5PPP/6K1 b - - 0 1", 2).as_deref(), Some("a8a1"));
    }

    #[test]
    fn test_wins_hanging_queen() {
        assert_eq!(best("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1", 2).as_deref(), Some("d2d5"));
    }

    #[test]
    fn test_no_legal_moves() {
        // 被将死
        assert_eq!(best("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3", 2), None);
        // 困毙
        assert_eq!(best("k7/P7/1K6/8/8/8/8/8 b - - 0 1", 2), None);
    }

    #[test]
    fn test_search_is_deterministic() {
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3";
        let state = Fen::parse(fen).unwrap();
        let mut engine = AiEngine::from_difficulty(Difficulty::Easy);

        let first = engine.search(&state);
        let nodes = engine.nodes_searched();
        let second = engine.search(&state);

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(nodes, engine.nodes_searched());
    }

    #[test]
    fn test_search_restores_state() {
        let state = BoardState::initial();
        let before = state.clone();
        let mut engine = AiEngine::from_difficulty(Difficulty::Easy);
        engine.search(&state);
        assert_eq!(state, before);
    }

    #[test]
    fn test_cancelled_search_returns_none() {
        let state = BoardState::initial();
        let mut engine = AiEngine::from_difficulty(Difficulty::Easy);
        engine.cancel_handle().cancel();
        assert_eq!(engine.search(&state), None);
    }

    #[test]
    fn test_search_task() {
        let state = Fen::parse("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1").unwrap();
        let task = SearchTask::spawn(AiConfig::from_difficulty(Difficulty::Easy), state);
        let mv = task.join().unwrap();
        assert_eq!(mv.map(|m| m.to_string()).as_deref(), Some("a1a8"));
    }

    #[test]
    fn test_search_task_cancel() {
        let config = AiConfig::from_difficulty(Difficulty::Hard);
        let task = SearchTask::spawn(config, BoardState::initial());
        task.cancel();
        assert_eq!(task.join().unwrap(), None);
    }

    #[test]
    fn test_search_task_panic_reaches_caller() {
        let task = SearchTask::start(CancelHandle::default(), || panic!("evaluation failed"));
        assert!(task.join().is_err());
    }

    #[test]
    fn test_takes_quickest_mate() {
        // Rh8 立即将死；其他许多走法也能在两步内将死
        let state = Fen::parse("k7/8/1K6/8/8/8/8/7R w - - 0 1").unwrap();
        let mut engine = AiEngine::from_difficulty(Difficulty::Hard);

        let (mv, score) = engine.search_root(&state, 4).unwrap();
        assert_eq!(mv.to_string(), "h1h8");
        assert_eq!(score, MATE_SCORE - 1);
    }

    #[test]
    fn test_mate_score_counts_distance() {
        // 没有一步杀，Kb6 之后 Rh8 将死
        let state = Fen::parse("k7/8/2K5/8/8/8/8/7R w - - 0 1").unwrap();
        let mut engine = AiEngine::from_difficulty(Difficulty::Hard);

        let (_, score) = engine.search_root(&state, 4).unwrap();
        assert_eq!(score, MATE_SCORE - 3);

        // 被将死的一方：越晚越好
        let black = Fen::parse("k7/8/1K6/8/8/8/8/7R b - - 0 1").unwrap();
        let (_, score) = engine.search_root(&black, 3).unwrap();
        assert_eq!(score, -(MATE_SCORE - 2));
    }

    #[test]
    fn test_transposition_table_is_used_and_stable() {
        let state = BoardState::initial();
        let mut engine = AiEngine::from_difficulty(Difficulty::Medium);

        let first = engine.search(&state);
        let nodes = engine.nodes_searched();
        let stats = engine.tt_stats();
        assert!(stats.hits > 0);
        assert!(stats.used > 0);

        // 每次搜索前清空，重复搜索走法、节点数和命中数都不变
        let second = engine.search(&state);
        assert_eq!(first, second);
        assert_eq!(nodes, engine.nodes_searched());
        assert_eq!(stats, engine.tt_stats());
    }

    #[test]
    fn test_difficulty_config() {
        let easy = AiConfig::from_difficulty(Difficulty::Easy);
        assert_eq!(easy.max_depth, 2);

        let medium = AiConfig::from_difficulty(Difficulty::Medium);
        assert_eq!(medium.max_depth, 3);

        let hard = AiConfig::from_difficulty(Difficulty::Hard);
        assert_eq!(hard.max_depth, 4);

        assert_eq!(AiConfig::default().difficulty, Difficulty::Medium);
    }
}
