use crate::jvm::code::InsnIndex;

/// Index of a block in a [`BlockTree`]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockId(usize);

impl BlockId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Interval of instructions spanned by some control flow edge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Lower end of the edge
    pub start: InsnIndex,

    /// Upper end of the edge
    pub end: InsnIndex,

    /// Enclosing block (only the root has none)
    pub parent: Option<BlockId>,

    /// Nested blocks, ordered by position
    pub children: Vec<BlockId>,
}

impl Block {
    /// Is the interval inside this block's interval (possibly equal)?
    fn encloses(&self, start: InsnIndex, end: InsnIndex) -> bool {
        self.start <= start && end <= self.end
    }

    /// Do the insides of the intervals overlap?
    ///
    /// Blocks sharing only an endpoint don't overlap: the endpoints are the branch and its target,
    /// and only the instructions strictly between them belong to the block.
    fn overlaps(&self, start: InsnIndex, end: InsnIndex) -> bool {
        self.start < end && start < self.end
    }
}

/// Nested intervals of instructions, built up from the branch edges discovered during simulation
///
/// Every edge `(from, to)` becomes the interval `[min(from, to), max(from, to)]`. Intervals are
/// kept strictly nested: siblings never have overlapping insides and a child lies within its
/// parent. When a new edge crosses existing blocks, it gets widened to cover them.
///
/// The tree is an arena: blocks are never removed, only re-parented.
#[derive(Clone, Debug)]
pub struct BlockTree {
    blocks: Vec<Block>,
}

impl BlockTree {
    pub const ROOT: BlockId = BlockId(0);

    /// Tree containing only the root block, spanning the method body
    pub fn new(code_len: usize) -> BlockTree {
        BlockTree {
            blocks: vec![Block {
                start: 0,
                end: code_len.saturating_sub(1),
                parent: None,
                children: vec![],
            }],
        }
    }

    pub fn get(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(idx, block)| (BlockId(idx), block))
    }

    /// Insert the interval spanned by a control flow edge
    ///
    /// Returns the new block, or `None` if the interval was already in the tree (or the edge is a
    /// self-loop, which spans nothing).
    pub fn insert_edge(&mut self, from: InsnIndex, to: InsnIndex) -> Option<BlockId> {
        if from == to {
            return None;
        }
        let mut start = from.min(to);
        let mut end = from.max(to);

        // Find the deepest block enclosing the interval
        let mut parent = BlockTree::ROOT;
        'descend: loop {
            let parent_block = self.get(parent);
            if parent_block.start == start && parent_block.end == end {
                return None;
            }
            for child in &parent_block.children {
                let child_block = self.get(*child);
                if child_block.encloses(start, end) {
                    parent = *child;
                    continue 'descend;
                }
            }
            break;
        }

        // Widen over children that partially overlap, until nothing does
        loop {
            let mut widened = false;
            for child in &self.get(parent).children {
                let child_block = self.get(*child);
                let inside = start <= child_block.start && child_block.end <= end;
                if child_block.overlaps(start, end) && !inside {
                    start = start.min(child_block.start);
                    end = end.max(child_block.end);
                    widened = true;
                }
            }
            if !widened {
                break;
            }
        }
        let parent_block = self.get(parent);
        if parent_block.start == start && parent_block.end == end {
            return None;
        }

        // Re-parent the children now inside the new block
        let new_id = BlockId(self.blocks.len());
        let (absorbed, kept): (Vec<BlockId>, Vec<BlockId>) =
            parent_block.children.iter().copied().partition(|child| {
                let child_block = self.get(*child);
                start <= child_block.start && child_block.end <= end
            });
        for child in &absorbed {
            self.blocks[child.0].parent = Some(new_id);
        }
        self.blocks.push(Block {
            start,
            end,
            parent: Some(parent),
            children: absorbed,
        });

        let mut children = kept;
        children.push(new_id);
        let blocks = &self.blocks;
        children.sort_by_key(|child| (blocks[child.0].end, blocks[child.0].start));
        self.blocks[parent.0].children = children;

        log::debug!(
            "Inserted block [{}, {}] for edge {} -> {} under [{}, {}]",
            start,
            end,
            from,
            to,
            self.blocks[parent.0].start,
            self.blocks[parent.0].end
        );
        Some(new_id)
    }

    /// Innermost block containing the instruction strictly inside its interval
    ///
    /// Instructions at the boundary of a block (the branch and its target) belong to the parent.
    pub fn block_at(&self, index: InsnIndex) -> BlockId {
        let mut current = BlockTree::ROOT;
        'descend: loop {
            for child in &self.get(current).children {
                let child_block = self.get(*child);
                if child_block.start < index && index < child_block.end {
                    current = *child;
                    continue 'descend;
                }
            }
            return current;
        }
    }

    /// Number of ancestors of the block (the root has depth 0)
    pub fn depth(&self, id: BlockId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.get(current).parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Innermost block enclosing both instructions, unless that is the root
    pub fn common_ancestor(&self, i: InsnIndex, j: InsnIndex) -> Option<BlockId> {
        let mut a = self.block_at(i);
        let mut b = self.block_at(j);
        let mut depth_a = self.depth(a);
        let mut depth_b = self.depth(b);

        while a != b {
            if depth_a >= depth_b {
                a = self.get(a).parent?;
                depth_a -= 1;
            } else {
                b = self.get(b).parent?;
                depth_b -= 1;
            }
        }
        Some(a).filter(|block| *block != BlockTree::ROOT)
    }

    /// Is the instruction's block the given block or nested inside it?
    pub fn is_within(&self, index: InsnIndex, block: BlockId) -> bool {
        let mut current = Some(self.block_at(index));
        while let Some(id) = current {
            if id == block {
                return true;
            }
            current = self.get(id).parent;
        }
        false
    }
}
