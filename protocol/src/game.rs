//! 对局驱动
//!
//! 持有当前局面、对局记录和状态，所有走子都经过合法走法列表校验。

use crate::board::BoardState;
use crate::classify::{GameClassifier, GameStatus};
use crate::error::ChessError;
use crate::moves::{Move, MoveGenerator};
use crate::notation::Notation;
use crate::piece::{PieceKind, Square};
use crate::record::GameRecord;

/// 一局棋
#[derive(Debug, Clone)]
pub struct Game {
    state: BoardState,
    record: GameRecord,
    status: GameStatus,
    /// 每步的标准代数记号
    san: Vec<String>,
}

impl Game {
    /// 从初始局面开始
    pub fn new() -> Self {
        Self::from_state(BoardState::initial())
    }

    /// 从指定局面开始
    pub fn from_state(state: BoardState) -> Self {
        let record = GameRecord::new();
        let status = GameClassifier::classify(&state, &record);
        Self {
            state,
            record,
            status,
            san: Vec::new(),
        }
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn record(&self) -> &GameRecord {
        &self.record
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// 已走各步的标准代数记号
    pub fn san_moves(&self) -> &[String] {
        &self.san
    }

    /// 当前局面指纹
    pub fn fingerprint(&self) -> u64 {
        self.state.fingerprint()
    }

    /// 当前走子方的合法走法
    pub fn legal_moves(&self) -> Vec<Move> {
        if self.status.is_terminal() {
            return Vec::new();
        }
        MoveGenerator::generate_legal(&self.state)
    }

    /// 在合法走法中查找起点、终点和升变都匹配的一步
    pub fn find_move(
        &self,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> Result<Move, ChessError> {
        self.legal_moves()
            .into_iter()
            .find(|m| m.from == from && m.to == to && m.promotion() == promotion)
            .ok_or(ChessError::IllegalMove {
                origin: from,
                destination: to,
            })
    }

    /// 走一步棋，返回走后的状态
    pub fn play(&mut self, mv: &Move) -> Result<GameStatus, ChessError> {
        if self.status.is_terminal() {
            return Err(ChessError::GameOver);
        }

        // 必须是合法走法列表中的一步
        if !MoveGenerator::generate_legal(&self.state).contains(mv) {
            return Err(ChessError::IllegalMove {
                origin: mv.from,
                destination: mv.to,
            });
        }

        let fingerprint = self.state.fingerprint();
        let san = Notation::to_san(&self.state, mv);
        self.state.apply(mv)?;
        self.record.push(fingerprint, *mv);
        self.status = GameClassifier::classify(&self.state, &self.record);

        tracing::debug!(mv = %mv, san = %san, status = ?self.status, "move applied");
        self.san.push(san);
        Ok(self.status)
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}
