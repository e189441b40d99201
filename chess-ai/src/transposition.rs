//! 置换表
//!
//! 按局面指纹缓存搜索结果，不同走法顺序到达的同一局面只搜索一次

use protocol::Move;

/// 置换表条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// 精确值
    Exact,
    /// 下界（Beta 截断，真实分数不低于记录值）
    LowerBound,
    /// 上界（没有走法超过 Alpha，真实分数不高于记录值）
    UpperBound,
}

/// 置换表条目
#[derive(Debug, Clone, Copy)]
pub struct TTEntry {
    /// 指纹的高 32 位（用于验证）
    pub key: u32,
    /// 分数（将死分按本节点距离记录，见 `MATE_BOUND`）
    pub score: i32,
    /// 搜索深度
    pub depth: u8,
    /// 条目类型
    pub entry_type: EntryType,
    /// 最佳走法（from << 10 | to << 4 | 升变），0 表示没有
    pub best_move: u16,
}

impl TTEntry {
    pub fn new(
        key: u32,
        score: i32,
        depth: u8,
        entry_type: EntryType,
        best_move: Option<&Move>,
    ) -> Self {
        Self {
            key,
            score,
            depth,
            entry_type,
            best_move: best_move.map(encode_move).unwrap_or(0),
        }
    }

    /// 记录的最佳走法是否就是 `mv`
    pub fn is_best(&self, mv: &Move) -> bool {
        self.best_move != 0 && self.best_move == encode_move(mv)
    }
}

/// 走法编码；起点和终点不同，所以结果不会是 0
pub fn encode_move(mv: &Move) -> u16 {
    let promotion = mv.promotion().map_or(0, |kind| kind.index() as u16 + 1);
    ((mv.from.to_index() as u16) << 10) | ((mv.to.to_index() as u16) << 4) | promotion
}

/// 置换表统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TTStats {
    pub entries: usize,
    pub used: usize,
    pub hits: u64,
    pub lookups: u64,
}

/// 置换表
pub struct TranspositionTable {
    entries: Vec<Option<TTEntry>>,
    size: usize,
    hits: u64,
    lookups: u64,
}

impl TranspositionTable {
    /// 创建指定大小的置换表（MB）
    pub fn new(size_mb: usize) -> Self {
        let entry_size = std::mem::size_of::<Option<TTEntry>>();
        let size = (size_mb.max(1) * 1024 * 1024 / entry_size).max(1);

        Self {
            entries: vec![None; size],
            size,
            hits: 0,
            lookups: 0,
        }
    }

    /// 默认大小（16MB）
    pub fn default_size() -> Self {
        Self::new(16)
    }

    #[inline]
    fn index(&self, hash: u64) -> usize {
        (hash % self.size as u64) as usize
    }

    #[inline]
    fn verification_key(hash: u64) -> u32 {
        (hash >> 32) as u32
    }

    /// 查询局面
    pub fn lookup(&mut self, hash: u64) -> Option<TTEntry> {
        self.lookups += 1;
        let entry = self.entries[self.index(hash)]?;
        if entry.key == Self::verification_key(hash) {
            self.hits += 1;
            Some(entry)
        } else {
            None
        }
    }

    /// 存储局面；同一槽位只被不浅于它的结果替换，除非是另一个局面
    pub fn store(
        &mut self,
        hash: u64,
        score: i32,
        depth: u8,
        entry_type: EntryType,
        best_move: Option<&Move>,
    ) {
        let index = self.index(hash);
        let key = Self::verification_key(hash);

        let replace = match &self.entries[index] {
            None => true,
            Some(existing) => existing.key != key || depth >= existing.depth,
        };
        if replace {
            self.entries[index] = Some(TTEntry::new(key, score, depth, entry_type, best_move));
        }
    }

    /// 清空置换表
    pub fn clear(&mut self) {
        self.entries.fill(None);
        self.hits = 0;
        self.lookups = 0;
    }

    pub fn stats(&self) -> TTStats {
        TTStats {
            entries: self.size,
            used: self.entries.iter().filter(|e| e.is_some()).count(),
            hits: self.hits,
            lookups: self.lookups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{BoardState, MoveGenerator};

    fn first_move() -> Move {
        MoveGenerator::generate_legal(&BoardState::initial())[0]
    }

    #[test]
    fn test_store_and_lookup() {
        let mut tt = TranspositionTable::new(1);
        let hash = 0x1234_5678_9ABC_DEF0u64;
        let mv = first_move();

        tt.store(hash, 100, 5, EntryType::Exact, Some(&mv));

        let entry = tt.lookup(hash).unwrap();
        assert_eq!(entry.score, 100);
        assert_eq!(entry.depth, 5);
        assert_eq!(entry.entry_type, EntryType::Exact);
        assert!(entry.is_best(&mv));
        assert_eq!(tt.stats().hits, 1);
    }

    #[test]
    fn test_lookup_miss() {
        let mut tt = TranspositionTable::new(1);
        assert!(tt.lookup(0x1234_5678_9ABC_DEF0).is_none());

        // 同一槽位、不同局面
        let size = tt.size as u64;
        tt.store(7, 50, 3, EntryType::LowerBound, None);
        assert!(tt.lookup(7 + size * (1u64 << 32)).is_none());
        assert_eq!(tt.stats().lookups, 2);
        assert_eq!(tt.stats().hits, 0);
    }

    #[test]
    fn test_shallower_result_does_not_replace() {
        let mut tt = TranspositionTable::new(1);
        let hash = 0x9876_5432_1000_0001u64;

        tt.store(hash, 100, 5, EntryType::Exact, None);
        tt.store(hash, 200, 3, EntryType::UpperBound, None);
        assert_eq!(tt.lookup(hash).unwrap().score, 100);

        tt.store(hash, 300, 6, EntryType::LowerBound, None);
        let entry = tt.lookup(hash).unwrap();
        assert_eq!(entry.score, 300);
        assert_eq!(entry.entry_type, EntryType::LowerBound);
        assert_eq!(entry.best_move, 0);
    }

    #[test]
    fn test_clear() {
        let mut tt = TranspositionTable::new(1);
        tt.store(42, 1, 1, EntryType::Exact, None);
        assert_eq!(tt.stats().used, 1);

        tt.clear();
        assert_eq!(tt.stats().used, 0);
        assert!(tt.lookup(42).is_none());
    }

    #[test]
    fn test_move_encoding() {
        let moves = MoveGenerator::generate_legal(&BoardState::initial());
        let codes: std::collections::HashSet<u16> = moves.iter().map(encode_move).collect();
        assert_eq!(codes.len(), moves.len());
        assert!(!codes.contains(&0));
    }
}
