//! Arena storage for the search tree.

use cozy_chess::Move;
use sb_chess::nn_index;

use crate::node::{Node, NodeId};

/// All nodes of one search, root first. Node ids stay valid for the life of
/// the tree; the arena only grows.
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(None, 0, None)],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Append a child for `mv`; the caller publishes children in generator
    /// order at expansion, under the exclusive lock.
    pub fn add_child(&mut self, parent: NodeId, mv: Move) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node::new(Some(mv), nn_index(mv), Some(parent)));
        self.nodes[parent as usize].children.push(id);
        id
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_chess::Position;

    #[test]
    fn children_keep_generator_order() {
        let mut tree = Tree::new();
        let pos = Position::startpos();
        let moves = pos.legal_moves();
        for &mv in &moves {
            tree.add_child(tree.root(), mv);
        }
        assert_eq!(tree.len(), moves.len() + 1);
        let root = tree.get(tree.root());
        for (child, mv) in root.children().iter().zip(&moves) {
            assert_eq!(tree.get(*child).mv(), Some(*mv));
            assert_eq!(tree.get(*child).parent(), Some(tree.root()));
        }
    }
}
