//! 対局ごとの探索木（GameTree）
//!
//! 保持するのは現在局面（head）以下の部分木と、開始局面からの局面履歴のみ。
//! 指し手を進めると選ばれなかった兄弟の部分木は捨てられる。
//! エッジは手番相対表現の指し手を持ち、外部とのやり取りは絶対表現で行う。

use std::sync::{Arc, Mutex, MutexGuard};

use crate::board::{GameMove, Position, PositionHistory};
use crate::error::{Result, SelfPlayError};
use crate::types::Color;

/// 探索木のエッジ（親ノードから見た1手）
#[derive(Debug)]
pub struct Edge<M: GameMove> {
    mv: M,
    visits: u32,
    child: Option<Box<Node<M>>>,
}

impl<M: GameMove> Edge<M> {
    fn new(mv: M) -> Self {
        Self {
            mv,
            visits: 0,
            child: None,
        }
    }

    /// エッジの指し手。`flip` が真なら盤面を反転して絶対表現にする。
    #[inline]
    pub fn get_move(&self, flip: bool) -> M {
        if flip { self.mv.mirrored() } else { self.mv }
    }

    /// 手番相対表現の指し手
    #[inline]
    pub fn relative_move(&self) -> M {
        self.mv
    }

    #[inline]
    pub fn visits(&self) -> u32 {
        self.visits
    }

    pub fn set_visits(&mut self, visits: u32) {
        self.visits = visits;
    }

    pub fn add_visits(&mut self, n: u32) {
        self.visits = self.visits.saturating_add(n);
    }

    pub fn child(&self) -> Option<&Node<M>> {
        self.child.as_deref()
    }

    /// 子ノード（無ければ作る）
    pub fn child_mut(&mut self) -> &mut Node<M> {
        self.child.get_or_insert_with(Box::default)
    }
}

/// 探索木のノード
#[derive(Debug)]
pub struct Node<M: GameMove> {
    edges: Vec<Edge<M>>,
}

impl<M: GameMove> Default for Node<M> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

impl<M: GameMove> Node<M> {
    /// 合法手からエッジを作る。既に展開済みなら何もしない。
    pub fn create_edges(&mut self, legal_moves: &[M]) {
        if !self.edges.is_empty() {
            return;
        }
        self.edges = legal_moves.iter().copied().map(Edge::new).collect();
    }

    pub fn edges(&self) -> &[Edge<M>] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut [Edge<M>] {
        &mut self.edges
    }

    pub fn has_children(&self) -> bool {
        !self.edges.is_empty()
    }

    /// 手番相対表現の指し手に対応するエッジ
    pub fn edge(&self, relative: M) -> Option<&Edge<M>> {
        self.edges.iter().find(|e| e.mv == relative)
    }

    pub fn edge_mut(&mut self, relative: M) -> Option<&mut Edge<M>> {
        self.edges.iter_mut().find(|e| e.mv == relative)
    }

    /// エッジの訪問回数の合計
    pub fn total_visits(&self) -> u64 {
        self.edges.iter().map(|e| u64::from(e.visits)).sum()
    }

    /// エッジの訪問回数の最大値（エッジが無ければ 0）
    pub fn max_edge_visits(&self) -> u32 {
        self.edges.iter().map(|e| e.visits).max().unwrap_or(0)
    }

    /// 指し手で子に降りる。兄弟の部分木は捨てる。
    fn into_child(mut self, relative: M) -> Node<M> {
        self.edges
            .iter_mut()
            .find(|e| e.mv == relative)
            .and_then(|e| e.child.take())
            .map(|child| *child)
            .unwrap_or_default()
    }
}

/// 1対局分の探索木
pub struct GameTree<P: Position> {
    history: PositionHistory<P>,
    /// 開始局面からの指し手（手番相対表現）
    moves: Vec<P::Move>,
    head: Node<P::Move>,
}

impl<P: Position> GameTree<P> {
    /// 開始局面と強制手順から木を作る。強制手順は絶対表現。
    pub fn from_fen(fen: &str, moves: &[P::Move]) -> Result<Self> {
        let start = P::from_fen(fen)?;
        let mut tree = Self {
            history: PositionHistory::new(start),
            moves: Vec::new(),
            head: Node::default(),
        };
        for &mv in moves {
            tree.make_checked_move(mv)?;
        }
        Ok(tree)
    }

    /// 合法性を確かめてから指す
    fn make_checked_move(&mut self, mv: P::Move) -> Result<()> {
        let relative = mv.relative_to(self.side_to_move());
        if !self.head_position().legal_moves().contains(&relative) {
            return Err(SelfPlayError::IllegalMove {
                mv: mv.to_string(),
                fen: self.head_position().to_fen(),
            });
        }
        self.make_move(mv);
        Ok(())
    }

    /// 絶対表現の指し手で head を進める
    pub fn make_move(&mut self, mv: P::Move) {
        let relative = mv.relative_to(self.side_to_move());
        let head = std::mem::take(&mut self.head);
        self.head = head.into_child(relative);
        self.history.append(relative);
        self.moves.push(relative);
    }

    /// head 以下の部分木を捨てる（木を再利用しない場合）
    pub fn trim_tree_at_head(&mut self) {
        self.head = Node::default();
    }

    pub fn current_head(&self) -> &Node<P::Move> {
        &self.head
    }

    pub fn current_head_mut(&mut self) -> &mut Node<P::Move> {
        &mut self.head
    }

    pub fn head_position(&self) -> &P {
        self.history.last()
    }

    pub fn position_history(&self) -> &PositionHistory<P> {
        &self.history
    }

    pub fn ply_count(&self) -> u32 {
        self.head_position().game_ply()
    }

    pub fn side_to_move(&self) -> Color {
        self.head_position().side_to_move()
    }

    pub fn is_black_to_move(&self) -> bool {
        self.head_position().is_black_to_move()
    }

    /// 開始局面からの指し手数
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    /// 開始局面からの指し手（絶対表現）。
    ///
    /// `chess960` が偽のときはキャスリングを従来表記に戻す。
    pub fn moves(&self, chess960: bool) -> Vec<P::Move> {
        self.history
            .positions()
            .iter()
            .zip(&self.moves)
            .map(|(pos, &relative)| {
                let mv = if chess960 {
                    relative
                } else {
                    pos.legacy_move(relative)
                };
                if pos.is_black_to_move() { mv.mirrored() } else { mv }
            })
            .collect()
    }
}

/// 両プレイヤーの木の持ち方
///
/// `Shared` は1本の木を両者で使い、`Independent` は手番ごとに別の木を持って
/// すべての指し手を両方に適用する。
pub enum GameTrees<P: Position> {
    Shared(Arc<Mutex<GameTree<P>>>),
    Independent([Arc<Mutex<GameTree<P>>>; 2]),
}

impl<P: Position> GameTrees<P> {
    pub fn new(fen: &str, moves: &[P::Move], shared: bool) -> Result<Self> {
        let first = GameTree::from_fen(fen, moves)?;
        if shared {
            Ok(GameTrees::Shared(Arc::new(Mutex::new(first))))
        } else {
            let second = GameTree::from_fen(fen, moves)?;
            Ok(GameTrees::Independent([
                Arc::new(Mutex::new(first)),
                Arc::new(Mutex::new(second)),
            ]))
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, GameTrees::Shared(_))
    }

    /// 指定した手番が使う木
    pub fn tree(&self, side: Color) -> &Arc<Mutex<GameTree<P>>> {
        match self {
            GameTrees::Shared(tree) => tree,
            GameTrees::Independent(trees) => &trees[side.index()],
        }
    }

    /// 指定した手番の木をロックする
    pub fn lock(&self, side: Color) -> MutexGuard<'_, GameTree<P>> {
        lock_tree(self.tree(side))
    }

    /// 指し手を全ての木に適用する
    pub fn make_move(&self, mv: P::Move) {
        match self {
            GameTrees::Shared(tree) => lock_tree(tree).make_move(mv),
            GameTrees::Independent(trees) => {
                for tree in trees {
                    lock_tree(tree).make_move(mv);
                }
            }
        }
    }
}

/// 木のロックを取る。探索エンジンの panic で poison されても木の状態は使える。
pub fn lock_tree<P: Position>(tree: &Mutex<GameTree<P>>) -> MutexGuard<'_, GameTree<P>> {
    tree.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tictactoe::{STARTPOS, Square, TicTacToe};

    fn sq(s: &str) -> Square {
        Square::parse(s).unwrap()
    }

    #[test]
    fn test_opening_moves_are_applied() {
        let tree = GameTree::<TicTacToe>::from_fen(STARTPOS, &[sq("b2"), sq("a1")]).unwrap();
        assert_eq!(tree.ply_count(), 2);
        assert_eq!(tree.head_position().to_fen(), ".../.x./o..");
        assert_eq!(tree.moves(false), vec![sq("b2"), sq("a1")]);
    }

    #[test]
    fn test_illegal_opening_move_is_rejected() {
        let err = GameTree::<TicTacToe>::from_fen(STARTPOS, &[sq("b2"), sq("b2")]);
        assert!(matches!(err, Err(SelfPlayError::IllegalMove { .. })));
    }

    #[test]
    fn test_make_move_keeps_chosen_subtree() {
        let mut tree = GameTree::<TicTacToe>::from_fen(STARTPOS, &[]).unwrap();
        let legal = tree.head_position().legal_moves();
        let head = tree.current_head_mut();
        head.create_edges(&legal);
        let edge = head.edge_mut(sq("b2")).unwrap();
        edge.set_visits(10);
        let child = edge.child_mut();
        child.create_edges(&[sq("a1"), sq("c3")]);

        tree.make_move(sq("b2"));
        assert_eq!(tree.current_head().edges().len(), 2);

        tree.trim_tree_at_head();
        assert!(!tree.current_head().has_children());
    }

    #[test]
    fn test_shared_and_independent_trees() {
        let shared = GameTrees::<TicTacToe>::new(STARTPOS, &[], true).unwrap();
        shared.make_move(sq("a1"));
        assert_eq!(shared.lock(Color::Black).ply_count(), 1);
        assert!(Arc::ptr_eq(shared.tree(Color::White), shared.tree(Color::Black)));

        let independent = GameTrees::<TicTacToe>::new(STARTPOS, &[], false).unwrap();
        independent.make_move(sq("a1"));
        assert_eq!(independent.lock(Color::White).ply_count(), 1);
        assert_eq!(independent.lock(Color::Black).ply_count(), 1);
        assert!(!Arc::ptr_eq(independent.tree(Color::White), independent.tree(Color::Black)));
    }
}
