pub mod keyword;

use std::ops::Range;

pub use keyword::{Keyword, Modifier};

/// Index of a node inside a [`BlockForest`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One parsed directive.
#[derive(Debug, Clone)]
pub struct Block {
    pub keyword: Keyword,
    /// Raw trailing text of the directive, trimmed.
    pub argument: String,
    /// Enclosing block, or `None` at the forest root. Never an ownership edge.
    pub parent: Option<NodeId>,
    /// Render-ordered children.
    pub children: Vec<NodeId>,
    /// Template this directive was written in; kept as-is for inlined imports.
    pub template_id: Option<String>,
    /// Byte span of the directive in the normalized source of `template_id`.
    pub span: Range<usize>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Block(Block),
    Text(String),
}

/// The ordered top-level sequence of a template, with every node stored in
/// one arena. Children and parents refer to each other by [`NodeId`].
#[derive(Debug, Clone, Default)]
pub struct BlockForest {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    pub template_id: Option<String>,
}

impl BlockForest {
    pub fn new(template_id: Option<&str>) -> Self {
        BlockForest {
            nodes: Vec::new(),
            roots: Vec::new(),
            template_id: template_id.map(str::to_string),
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn block(&self, id: NodeId) -> Option<&Block> {
        match self.node(id) {
            Node::Block(block) => Some(block),
            Node::Text(_) => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.block(id).and_then(|b| b.parent)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append `node` as the last child of `parent`, or as a root.
    pub(crate) fn append(&mut self, parent: Option<NodeId>, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        match parent {
            Some(parent_id) => match &mut self.nodes[parent_id.0] {
                Node::Block(block) => block.children.push(id),
                Node::Text(_) => unreachable!("text nodes never become insertion points"),
            },
            None => self.roots.push(id),
        }
        id
    }

    /// Detach block `id` from its parent and append it under `to`.
    pub(crate) fn move_block(&mut self, id: NodeId, to: Option<NodeId>) {
        let from = self.parent(id);
        let siblings = match from {
            Some(from) => match &mut self.nodes[from.0] {
                Node::Block(block) => &mut block.children,
                Node::Text(_) => return,
            },
            None => &mut self.roots,
        };
        siblings.retain(|&child| child != id);
        if let Node::Block(block) = &mut self.nodes[id.0] {
            block.parent = to;
        }
        match to {
            Some(parent_id) => {
                if let Node::Block(block) = &mut self.nodes[parent_id.0] {
                    block.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
    }

    /// Append a text fragment.
    pub(crate) fn append_text(&mut self, parent: Option<NodeId>, text: &str) -> NodeId {
        self.append(parent, Node::Text(text.to_string()))
    }

    /// Render the tree in an indented outline, one node per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            self.outline_node(root, 0, &mut out);
        }
        out
    }

    fn outline_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match self.node(id) {
            Node::Text(text) => {
                out.push_str(&format!("{}text {:?}\n", pad, text));
            }
            Node::Block(block) => {
                if block.argument.is_empty() {
                    out.push_str(&format!("{}{}\n", pad, block.keyword));
                } else {
                    out.push_str(&format!("{}{} {}\n", pad, block.keyword, block.argument));
                }
                for &child in &block.children {
                    self.outline_node(child, depth + 1, out);
                }
            }
        }
    }
}
