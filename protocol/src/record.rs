//! 对局记录
//!
//! 按顺序保存每一步的走法和走之前局面的指纹，用于重复局面判定。

use serde::{Deserialize, Serialize};

use crate::moves::Move;

/// 一条记录：走之前的局面指纹和走法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub fingerprint: u64,
    pub mv: Move,
}

/// 对局记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    entries: Vec<RecordEntry>,
}

impl GameRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一步（fingerprint 为走之前的局面）
    pub fn push(&mut self, fingerprint: u64, mv: Move) {
        self.entries.push(RecordEntry { fingerprint, mv });
    }

    /// 指纹在记录中出现的次数
    pub fn repetitions(&self, fingerprint: u64) -> usize {
        self.entries
            .iter()
            .filter(|e| e.fingerprint == fingerprint)
            .count()
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    /// 所有走法
    pub fn moves(&self) -> impl Iterator<Item = &Move> {
        self.entries.iter().map(|e| &e.mv)
    }

    pub fn last(&self) -> Option<&RecordEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 坐标记法的走法列表，如 `e2e4 e7e5`
    pub fn to_move_list(&self) -> String {
        self.moves()
            .map(|mv| mv.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
