//! 对局状态判定

use serde::{Deserialize, Serialize};

use crate::board::{Board, BoardState};
use crate::constants::FIFTY_MOVE_LIMIT;
use crate::moves::MoveGenerator;
use crate::piece::{Color, PieceKind};
use crate::record::GameRecord;

/// 和棋原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrawReason {
    /// 五十回合无吃子、无兵走动
    FiftyMoves,
    /// 三次重复局面
    Repetition,
    /// 双方都没有将死对方的子力
    InsufficientMaterial,
}

/// 对局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    Ongoing,
    /// 走子方被将军（非终局）
    Check,
    Checkmate { winner: Color },
    Stalemate,
    Draw(DrawReason),
}

impl GameStatus {
    /// 是否终局
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::Ongoing | GameStatus::Check)
    }
}

/// 对局状态判定器
pub struct GameClassifier;

impl GameClassifier {
    /// 判定当前局面
    ///
    /// 依次检查：将死、逼和、将军、五十回合、三次重复、子力不足。
    pub fn classify(state: &BoardState, record: &GameRecord) -> GameStatus {
        let side = state.side_to_move;
        let in_check = MoveGenerator::is_in_check(&state.board, side);

        if MoveGenerator::generate_legal(state).is_empty() {
            return if in_check {
                GameStatus::Checkmate {
                    winner: side.opponent(),
                }
            } else {
                GameStatus::Stalemate
            };
        }

        if in_check {
            return GameStatus::Check;
        }

        if state.halfmove_clock >= FIFTY_MOVE_LIMIT {
            return GameStatus::Draw(DrawReason::FiftyMoves);
        }

        if record.repetitions(state.fingerprint()) >= 2 {
            return GameStatus::Draw(DrawReason::Repetition);
        }

        if Self::insufficient_material(&state.board) {
            return GameStatus::Draw(DrawReason::InsufficientMaterial);
        }

        GameStatus::Ongoing
    }

    /// 子力不足判定
    ///
    /// 王对王、王加单个轻子对王、以及所有非王棋子都是同色格的象。
    pub fn insufficient_material(board: &Board) -> bool {
        let others: Vec<_> = board
            .all_pieces()
            .into_iter()
            .filter(|(_, p)| p.kind != PieceKind::King)
            .collect();

        match others.as_slice() {
            [] => true,
            [(_, piece)] => piece.kind.is_minor(),
            [(first, _), ..] => others
                .iter()
                .all(|(sq, p)| p.kind == PieceKind::Bishop && sq.is_light() == first.is_light()),
        }
    }
}
