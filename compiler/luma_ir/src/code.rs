//! Validated control-flow graph of basic blocks.
//!
//! A [`Code`] is built incrementally with a [`CodeBuilder`] that keeps an
//! implicit "current block" cursor. Validation happens exactly once, in
//! [`CodeBuilder::build`]; after that a `Code` is immutable and every label
//! referenced by a terminator is guaranteed to be defined.

use rustc_hash::FxHashMap;

use crate::ids::{Label, NodeId};
use crate::node::{BranchCondition, Node, Terminator};

/// Structural errors detected while building a [`Code`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CfgError {
    #[error("code has no blocks")]
    Empty,
    #[error("label {0} is referenced but never defined")]
    UndefinedLabel(Label),
    #[error("label {0} is defined more than once")]
    DuplicateLabel(Label),
    #[error("node added after a terminator without opening a new label")]
    NoOpenBlock,
    #[error("block {0} has no terminator")]
    Unterminated(Label),
}

/// A basic block: a label, straight-line body nodes, and one terminator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicBlock {
    pub label: Label,
    pub body: Vec<Node>,
    pub terminator: Terminator,
}

impl BasicBlock {
    /// `NodeId` of the terminator.
    pub fn terminator_id(&self) -> NodeId {
        NodeId::new(self.label, node_index(self.body.len()))
    }

    /// `NodeId` of the body node at `idx` (or of the terminator when
    /// `idx == body.len()`).
    pub fn node_id(&self, idx: usize) -> NodeId {
        NodeId::new(self.label, node_index(idx))
    }

    /// Number of addressable nodes (body plus terminator).
    pub fn node_count(&self) -> usize {
        self.body.len() + 1
    }
}

#[inline]
pub(crate) fn node_index(idx: usize) -> u32 {
    u32::try_from(idx).unwrap_or(u32::MAX)
}

/// Immutable, validated `Label → BasicBlock` map.
///
/// Blocks keep the order in which they were built; the first block is the
/// entry. Cached code is stored as its block list and revalidated on load.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "cache",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "Vec<BasicBlock>", try_from = "Vec<BasicBlock>")
)]
pub struct Code {
    blocks: Vec<BasicBlock>,
    index: FxHashMap<Label, usize>,
}

impl Code {
    pub fn entry_label(&self) -> Label {
        self.blocks[0].label
    }

    pub fn entry_block(&self) -> &BasicBlock {
        &self.blocks[0]
    }

    /// Blocks in construction order.
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, label: Label) -> Option<&BasicBlock> {
        self.index.get(&label).map(|&i| &self.blocks[i])
    }

    /// Position of the block in [`Code::blocks`].
    pub fn block_index(&self, label: Label) -> Option<usize> {
        self.index.get(&label).copied()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.blocks.iter().map(|b| b.label)
    }

    /// Body node at `id`, or `None` for a terminator position or an
    /// unknown label.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.block(id.label)?.body.get(id.index as usize)
    }
}

impl TryFrom<Vec<BasicBlock>> for Code {
    type Error = CfgError;

    /// Validate a block list; the first block becomes the entry.
    fn try_from(blocks: Vec<BasicBlock>) -> Result<Self, CfgError> {
        if blocks.is_empty() {
            return Err(CfgError::Empty);
        }

        let mut index = FxHashMap::default();
        for (i, block) in blocks.iter().enumerate() {
            if index.insert(block.label, i).is_some() {
                return Err(CfgError::DuplicateLabel(block.label));
            }
        }

        for block in &blocks {
            for succ in block.terminator.successors() {
                if !index.contains_key(&succ) {
                    return Err(CfgError::UndefinedLabel(succ));
                }
            }
        }

        Ok(Code { blocks, index })
    }
}

impl From<Code> for Vec<BasicBlock> {
    fn from(code: Code) -> Self {
        code.blocks
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Incremental builder for [`Code`].
///
/// The builder starts with an open entry block. Misuse (a node added while
/// no block is open) is recorded and reported by [`CodeBuilder::build`], so
/// front ends can emit without threading a `Result` through every call.
#[derive(Debug)]
pub struct CodeBuilder {
    blocks: Vec<BasicBlock>,
    current: Option<(Label, Vec<Node>)>,
    next_label: u32,
    error: Option<CfgError>,
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeBuilder {
    /// Create a builder with an open entry block.
    pub fn new() -> Self {
        let mut builder = Self {
            blocks: Vec::new(),
            current: None,
            next_label: 0,
            error: None,
        };
        let entry = builder.new_label();
        builder.current = Some((entry, Vec::new()));
        builder
    }

    /// Allocate a fresh label. It is not placed until passed to
    /// [`CodeBuilder::add_label`].
    pub fn new_label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Label of the currently open block.
    pub fn current_label(&self) -> Option<Label> {
        self.current.as_ref().map(|(label, _)| *label)
    }

    /// Open a new block at `label`.
    ///
    /// If the current block is still open it is closed with a fallthrough
    /// to `label`.
    pub fn add_label(&mut self, label: Label) {
        if self.current.is_some() {
            self.close(Terminator::ToNext { label });
        }
        self.current = Some((label, Vec::new()));
    }

    /// Append a body node to the current block.
    pub fn add_node(&mut self, node: Node) {
        match &mut self.current {
            Some((_, body)) => body.push(node),
            None => self.record(CfgError::NoOpenBlock),
        }
    }

    /// Close the current block with `terminator`.
    pub fn add_terminator(&mut self, terminator: Terminator) {
        if self.current.is_some() {
            self.close(terminator);
        } else {
            self.record(CfgError::NoOpenBlock);
        }
    }

    /// Branch to `target` when `condition` holds; otherwise fall through
    /// into a fresh label, which becomes the current block.
    pub fn add_branch(&mut self, condition: BranchCondition, target: Label) -> Label {
        let next = self.new_label();
        self.add_terminator(Terminator::Branch {
            condition,
            jump: target,
            next,
        });
        self.current = Some((next, Vec::new()));
        next
    }

    /// Validate and freeze the graph.
    pub fn build(mut self) -> Result<Code, CfgError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if let Some((label, _)) = self.current.take() {
            return Err(CfgError::Unterminated(label));
        }
        Code::try_from(self.blocks)
    }

    fn close(&mut self, terminator: Terminator) {
        if let Some((label, body)) = self.current.take() {
            self.blocks.push(BasicBlock {
                label,
                body,
                terminator,
            });
        }
    }

    fn record(&mut self, err: CfgError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}
