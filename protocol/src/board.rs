//! 棋盘状态

use serde::{Deserialize, Serialize};

use crate::constants::SQUARE_COUNT;
use crate::error::ChessError;
use crate::moves::{Move, SpecialMove};
use crate::piece::{Color, Piece, PieceKind, Square};
use crate::zobrist;

/// 棋盘
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// 8x8 棋盘，索引为 rank * 8 + file，使用 Vec 以支持 serde
    squares: Vec<Option<Piece>>,
}

impl Board {
    /// 创建空棋盘
    pub fn empty() -> Self {
        Self {
            squares: vec![None; SQUARE_COUNT],
        }
    }

    /// 创建初始棋盘
    pub fn initial() -> Self {
        let mut board = Self::empty();

        const BACK_RANK: [PieceKind; 8] = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];

        for color in [Color::White, Color::Black] {
            for (file, kind) in BACK_RANK.iter().enumerate() {
                board.set(
                    Square::new_unchecked(file as u8, color.back_rank()),
                    Some(Piece::new(*kind, color)),
                );
                board.set(
                    Square::new_unchecked(file as u8, color.pawn_rank()),
                    Some(Piece::new(PieceKind::Pawn, color)),
                );
            }
        }

        board
    }

    /// 获取指定格子的棋子
    pub fn get(&self, sq: Square) -> Option<Piece> {
        if sq.is_valid() {
            self.squares[sq.to_index()]
        } else {
            None
        }
    }

    /// 设置指定格子的棋子
    pub fn set(&mut self, sq: Square, piece: Option<Piece>) {
        if sq.is_valid() {
            self.squares[sq.to_index()] = piece;
        }
    }

    /// 查找指定阵营的国王位置
    pub fn find_king(&self, color: Color) -> Option<Square> {
        self.all_pieces()
            .into_iter()
            .find(|(_, p)| p.kind == PieceKind::King && p.color == color)
            .map(|(sq, _)| sq)
    }

    /// 获取指定阵营的所有棋子（a1 到 h8 的顺序）
    pub fn pieces(&self, color: Color) -> Vec<(Square, Piece)> {
        self.all_pieces()
            .into_iter()
            .filter(|(_, p)| p.color == color)
            .collect()
    }

    /// 获取所有棋子
    pub fn all_pieces(&self) -> Vec<(Square, Piece)> {
        self.squares
            .iter()
            .enumerate()
            .filter_map(|(index, piece)| {
                let piece = (*piece)?;
                Square::from_index(index).map(|sq| (sq, piece))
            })
            .collect()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

/// 单方的易位权
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastlingRights {
    /// 王翼（短易位）
    pub kingside: bool,
    /// 后翼（长易位）
    pub queenside: bool,
}

impl CastlingRights {
    pub const ALL: CastlingRights = CastlingRights {
        kingside: true,
        queenside: true,
    };

    pub const NONE: CastlingRights = CastlingRights {
        kingside: false,
        queenside: false,
    };

    /// 是否还有任意易位权
    pub fn any(&self) -> bool {
        self.kingside || self.queenside
    }
}

impl Default for CastlingRights {
    fn default() -> Self {
        Self::ALL
    }
}

/// 易位涉及的格子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CastleSquares {
    pub king_from: Square,
    pub king_to: Square,
    pub rook_from: Square,
    pub rook_to: Square,
}

impl CastleSquares {
    pub(crate) fn new(color: Color, kingside: bool) -> Self {
        let rank = color.back_rank();
        let (king_to, rook_from, rook_to) = if kingside { (6, 7, 5) } else { (2, 0, 3) };
        Self {
            king_from: Square::new_unchecked(4, rank),
            king_to: Square::new_unchecked(king_to, rank),
            rook_from: Square::new_unchecked(rook_from, rank),
            rook_to: Square::new_unchecked(rook_to, rank),
        }
    }

    /// 王与车之间必须为空的格子
    pub(crate) fn between(&self) -> impl Iterator<Item = Square> {
        let rank = self.king_from.rank;
        let (lo, hi) = if self.rook_from.file < self.king_from.file {
            (self.rook_from.file + 1, self.king_from.file)
        } else {
            (self.king_from.file + 1, self.rook_from.file)
        };
        (lo..hi).map(move |file| Square::new_unchecked(file, rank))
    }
}

/// 撤销一步棋所需的信息（apply 记录，revert 使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Undo {
    pub castling: [CastlingRights; 2],
    pub en_passant: Option<Square>,
    pub halfmove_clock: u32,
}

/// 完整的棋盘状态（包含走子方、易位权、吃过路兵目标和步数）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    /// 棋盘
    pub board: Board,
    /// 当前走子方
    pub side_to_move: Color,
    /// 易位权，按 Color::index 索引
    pub castling: [CastlingRights; 2],
    /// 吃过路兵的目标格（仅在双步推兵后的下一步有效）
    pub en_passant: Option<Square>,
    /// 半回合计数（兵的走动或吃子时清零，用于五十回合规则）
    pub halfmove_clock: u32,
    /// 完整回合数（黑方走完后 +1）
    pub fullmove_number: u32,
}

impl BoardState {
    /// 创建初始状态
    pub fn initial() -> Self {
        Self {
            board: Board::initial(),
            side_to_move: Color::White,
            castling: [CastlingRights::ALL; 2],
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    /// 从棋盘创建状态（无易位权）
    pub fn from_board(board: Board, side_to_move: Color) -> Self {
        Self {
            board,
            side_to_move,
            castling: [CastlingRights::NONE; 2],
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    /// 获取指定阵营的易位权
    pub fn castling_rights(&self, color: Color) -> CastlingRights {
        self.castling[color.index()]
    }

    /// 当前局面的 Zobrist 指纹
    pub fn fingerprint(&self) -> u64 {
        zobrist::hash(self)
    }

    /// 执行走法，返回撤销信息
    ///
    /// 走法必须与当前局面一致，否则返回 `IllegalMove` 且状态不变。
    /// 这里只检查走法与局面是否吻合，不检查是否会让己方国王被将。
    pub fn apply(&mut self, mv: &Move) -> Result<Undo, ChessError> {
        self.validate(mv)?;

        let undo = Undo {
            castling: self.castling,
            en_passant: self.en_passant,
            halfmove_clock: self.halfmove_clock,
        };
        let color = mv.piece.color;

        self.board.set(mv.from, None);
        match mv.special {
            SpecialMove::EnPassant => {
                self.board
                    .set(Square::new_unchecked(mv.to.file, mv.from.rank), None);
                self.board.set(mv.to, Some(mv.piece));
            }
            SpecialMove::CastleKingside | SpecialMove::CastleQueenside => {
                let squares =
                    CastleSquares::new(color, mv.special == SpecialMove::CastleKingside);
                let rook = self.board.get(squares.rook_from);
                self.board.set(squares.rook_from, None);
                self.board.set(squares.rook_to, rook);
                self.board.set(mv.to, Some(mv.piece));
            }
            SpecialMove::Promotion(kind) => {
                self.board.set(mv.to, Some(Piece::new(kind, color)));
            }
            SpecialMove::Normal | SpecialMove::DoublePawnPush => {
                self.board.set(mv.to, Some(mv.piece));
            }
        }

        if mv.piece.kind == PieceKind::King {
            self.castling[color.index()] = CastlingRights::NONE;
        }
        self.revoke_corner(mv.from);
        self.revoke_corner(mv.to);

        self.en_passant = if mv.special == SpecialMove::DoublePawnPush {
            mv.from.offset(0, color.pawn_direction())
        } else {
            None
        };

        if mv.piece.kind == PieceKind::Pawn || mv.captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }
        if color == Color::Black {
            self.fullmove_number += 1;
        }
        self.side_to_move = color.opponent();

        Ok(undo)
    }

    /// 撤销走法（必须是最近一次 apply 的走法和它返回的 Undo）
    pub fn revert(&mut self, mv: &Move, undo: Undo) {
        let color = mv.piece.color;

        self.board.set(mv.to, None);
        self.board.set(mv.from, Some(mv.piece));
        match mv.special {
            SpecialMove::EnPassant => {
                self.board.set(
                    Square::new_unchecked(mv.to.file, mv.from.rank),
                    mv.captured,
                );
            }
            SpecialMove::CastleKingside | SpecialMove::CastleQueenside => {
                let squares =
                    CastleSquares::new(color, mv.special == SpecialMove::CastleKingside);
                let rook = self.board.get(squares.rook_to);
                self.board.set(squares.rook_to, None);
                self.board.set(squares.rook_from, rook);
            }
            _ => self.board.set(mv.to, mv.captured),
        }

        self.castling = undo.castling;
        self.en_passant = undo.en_passant;
        self.halfmove_clock = undo.halfmove_clock;
        if color == Color::Black {
            self.fullmove_number -= 1;
        }
        self.side_to_move = color;
    }

    /// 函数式版本：返回执行走法后的新状态
    pub fn applied(&self, mv: &Move) -> Result<BoardState, ChessError> {
        let mut next = self.clone();
        next.apply(mv)?;
        Ok(next)
    }

    /// 车的原始角格被走离或被吃时，对应的易位权永久失去
    fn revoke_corner(&mut self, sq: Square) {
        for color in [Color::White, Color::Black] {
            if sq.rank != color.back_rank() {
                continue;
            }
            let rights = &mut self.castling[color.index()];
            match sq.file {
                0 => rights.queenside = false,
                7 => rights.kingside = false,
                _ => {}
            }
        }
    }

    fn validate(&self, mv: &Move) -> Result<(), ChessError> {
        let illegal = ChessError::IllegalMove {
            origin: mv.from,
            destination: mv.to,
        };
        let color = mv.piece.color;

        if !mv.from.is_valid() || !mv.to.is_valid() || mv.from == mv.to {
            return Err(illegal);
        }
        if color != self.side_to_move || self.board.get(mv.from) != Some(mv.piece) {
            return Err(illegal);
        }
        if let Some(captured) = mv.captured {
            if captured.color == color || captured.kind == PieceKind::King {
                return Err(illegal);
            }
        }

        let ok = match mv.special {
            SpecialMove::Normal => self.board.get(mv.to) == mv.captured,
            SpecialMove::DoublePawnPush => {
                let dir = color.pawn_direction();
                mv.piece.kind == PieceKind::Pawn
                    && mv.from.rank == color.pawn_rank()
                    && mv.from.offset(0, 2 * dir) == Some(mv.to)
                    && mv.captured.is_none()
                    && mv
                        .from
                        .offset(0, dir)
                        .is_some_and(|mid| self.board.get(mid).is_none())
                    && self.board.get(mv.to).is_none()
            }
            SpecialMove::EnPassant => {
                let victim = Square::new_unchecked(mv.to.file, mv.from.rank);
                mv.piece.kind == PieceKind::Pawn
                    && self.en_passant == Some(mv.to)
                    && self.board.get(mv.to).is_none()
                    && mv.captured == Some(Piece::new(PieceKind::Pawn, color.opponent()))
                    && self.board.get(victim) == mv.captured
            }
            SpecialMove::Promotion(kind) => {
                mv.piece.kind == PieceKind::Pawn
                    && mv.to.rank == color.opponent().back_rank()
                    && PieceKind::PROMOTIONS.contains(&kind)
                    && self.board.get(mv.to) == mv.captured
            }
            SpecialMove::CastleKingside | SpecialMove::CastleQueenside => {
                let kingside = mv.special == SpecialMove::CastleKingside;
                let rights = self.castling_rights(color);
                let squares = CastleSquares::new(color, kingside);
                mv.piece.kind == PieceKind::King
                    && (if kingside { rights.kingside } else { rights.queenside })
                    && mv.from == squares.king_from
                    && mv.to == squares.king_to
                    && mv.captured.is_none()
                    && self.board.get(squares.rook_from)
                        == Some(Piece::new(PieceKind::Rook, color))
                    && squares.between().all(|sq| self.board.get(sq).is_none())
            }
        };

        if ok {
            Ok(())
        } else {
            Err(illegal)
        }
    }
}

impl Default for BoardState {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fen::Fen;

    fn sq(s: &str) -> Square {
        s.parse().unwrap()
    }

    fn white(kind: PieceKind) -> Piece {
        Piece::new(kind, Color::White)
    }

    fn black(kind: PieceKind) -> Piece {
        Piece::new(kind, Color::Black)
    }

    #[test]
    fn test_initial_board() {
        let board = Board::initial();

        assert_eq!(board.get(sq("e1")), Some(white(PieceKind::King)));
        assert_eq!(board.get(sq("d8")), Some(black(PieceKind::Queen)));
        assert_eq!(board.get(sq("a2")), Some(white(PieceKind::Pawn)));
        assert_eq!(board.get(sq("h7")), Some(black(PieceKind::Pawn)));
        assert!(board.get(sq("e4")).is_none());
        assert_eq!(board.all_pieces().len(), 32);
    }

    #[test]
    fn test_find_king() {
        let board = Board::initial();
        assert_eq!(board.find_king(Color::White), Some(sq("e1")));
        assert_eq!(board.find_king(Color::Black), Some(sq("e8")));
        assert!(Board::empty().find_king(Color::White).is_none());
    }

    #[test]
    fn test_double_push_sets_en_passant() {
        let mut state = BoardState::initial();
        let mv = Move::new(
            sq("e2"),
            sq("e4"),
            white(PieceKind::Pawn),
            None,
            SpecialMove::DoublePawnPush,
        );

        let undo = state.apply(&mv).unwrap();
        assert_eq!(state.en_passant, Some(sq("e3")));
        assert_eq!(state.side_to_move, Color::Black);
        assert_eq!(state.halfmove_clock, 0);
        assert_eq!(state.fullmove_number, 1);

        state.revert(&mv, undo);
        assert_eq!(state, BoardState::initial());
    }

    #[test]
    fn test_fullmove_after_black() {
        let mut state = BoardState::initial();
        state
            .apply(&Move::new(
                sq("g1"),
                sq("f3"),
                white(PieceKind::Knight),
                None,
                SpecialMove::Normal,
            ))
            .unwrap();
        assert_eq!(state.halfmove_clock, 1);

        let black_move = Move::new(
            sq("g8"),
            sq("f6"),
            black(PieceKind::Knight),
            None,
            SpecialMove::Normal,
        );
        let before = state.clone();
        let undo = state.apply(&black_move).unwrap();
        assert_eq!(state.fullmove_number, 2);
        assert_eq!(state.halfmove_clock, 2);

        state.revert(&black_move, undo);
        assert_eq!(state, before);
    }

    #[test]
    fn test_castling_moves_rook() {
        let mut state = Fen::parse("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let before = state.clone();
        let mv = Move::new(
            sq("e1"),
            sq("g1"),
            white(PieceKind::King),
            None,
            SpecialMove::CastleKingside,
        );

        let undo = state.apply(&mv).unwrap();
        assert_eq!(state.board.get(sq("g1")), Some(white(PieceKind::King)));
        assert_eq!(state.board.get(sq("f1")), Some(white(PieceKind::Rook)));
        assert!(state.board.get(sq("h1")).is_none());
        assert_eq!(state.castling_rights(Color::White), CastlingRights::NONE);
        assert_eq!(state.castling_rights(Color::Black), CastlingRights::ALL);

        state.revert(&mv, undo);
        assert_eq!(state, before);
    }

    #[test]
    fn test_queenside_castling_moves_rook() {
        let mut state = Fen::parse("r3k2r/8/8/8/8/8/8/R3K2R b KQkq - 0 1").unwrap();
        let mv = Move::new(
            sq("e8"),
            sq("c8"),
            black(PieceKind::King),
            None,
            SpecialMove::CastleQueenside,
        );

        state.apply(&mv).unwrap();
        assert_eq!(state.board.get(sq("c8")), Some(black(PieceKind::King)));
        assert_eq!(state.board.get(sq("d8")), Some(black(PieceKind::Rook)));
        assert!(state.board.get(sq("a8")).is_none());
    }

    #[test]
    fn test_en_passant_capture_and_revert() {
        let mut state = Fen::parse("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 1").unwrap();
        let before = state.clone();
        let mv = Move::new(
            sq("e5"),
            sq("d6"),
            white(PieceKind::Pawn),
            Some(black(PieceKind::Pawn)),
            SpecialMove::EnPassant,
        );

        let undo = state.apply(&mv).unwrap();
        assert!(state.board.get(sq("d5")).is_none());
        assert_eq!(state.board.get(sq("d6")), Some(white(PieceKind::Pawn)));
        assert!(state.en_passant.is_none());

        state.revert(&mv, undo);
        assert_eq!(state, before);
    }

    #[test]
    fn test_promotion_replaces_pawn() {
        let mut state = Fen::parse("1r2k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let before = state.clone();
        let mv = Move::new(
            sq("a7"),
            sq("b8"),
            white(PieceKind::Pawn),
            Some(black(PieceKind::Rook)),
            SpecialMove::Promotion(PieceKind::Knight),
        );

        let undo = state.apply(&mv).unwrap();
        assert_eq!(state.board.get(sq("b8")), Some(white(PieceKind::Knight)));
        assert!(state.board.get(sq("a7")).is_none());

        state.revert(&mv, undo);
        assert_eq!(state, before);
    }

    #[test]
    fn test_rook_capture_on_corner_revokes_right() {
        let mut state = Fen::parse("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let mv = Move::new(
            sq("a1"),
            sq("a8"),
            white(PieceKind::Rook),
            Some(black(PieceKind::Rook)),
            SpecialMove::Normal,
        );

        state.apply(&mv).unwrap();
        assert!(!state.castling_rights(Color::White).queenside);
        assert!(state.castling_rights(Color::White).kingside);
        assert!(!state.castling_rights(Color::Black).queenside);
        assert!(state.castling_rights(Color::Black).kingside);
    }

    #[test]
    fn test_apply_rejects_mismatch_without_mutating() {
        let mut state = BoardState::initial();

        // 起点棋子不符
        let wrong_piece = Move::new(
            sq("e2"),
            sq("e3"),
            white(PieceKind::Knight),
            None,
            SpecialMove::Normal,
        );
        assert!(matches!(
            state.apply(&wrong_piece),
            Err(ChessError::IllegalMove { .. })
        ));

        // 不是该方走棋
        let wrong_side = Move::new(
            sq("e7"),
            sq("e6"),
            black(PieceKind::Pawn),
            None,
            SpecialMove::Normal,
        );
        assert!(state.apply(&wrong_side).is_err());

        // 目标格内容与 captured 不一致
        let phantom_capture = Move::new(
            sq("e2"),
            sq("e3"),
            white(PieceKind::Pawn),
            Some(black(PieceKind::Pawn)),
            SpecialMove::Normal,
        );
        assert!(state.apply(&phantom_capture).is_err());

        // 无易位权或路径被挡
        let castle = Move::new(
            sq("e1"),
            sq("g1"),
            white(PieceKind::King),
            None,
            SpecialMove::CastleKingside,
        );
        assert!(state.apply(&castle).is_err());

        assert_eq!(state, BoardState::initial());
    }

    #[test]
    fn test_applied_keeps_original() {
        let state = BoardState::initial();
        let mv = Move::new(
            sq("b1"),
            sq("c3"),
            white(PieceKind::Knight),
            None,
            SpecialMove::Normal,
        );
        let next = state.applied(&mv).unwrap();

        assert_eq!(state, BoardState::initial());
        assert_eq!(next.board.get(sq("c3")), Some(white(PieceKind::Knight)));
    }
}
