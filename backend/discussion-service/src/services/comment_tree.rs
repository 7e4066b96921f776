//! Comment tree builder
//!
//! Turns the flat, ordered comment list of one post into a reply forest held in
//! an arena (`Vec` of slots plus an id -> slot map), so a new reply can be
//! attached to any depth with a single lookup.
//!
//! Arena invariant: a reply's slot index is always greater than its parent's.
//! Building assigns slots breadth-first and insertions append, which lets
//! `to_forest` assemble the nested output in one reverse sweep without recursion.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::Comment;
use crate::error::{ServiceError, ServiceResult};
use crate::services::votes::TargetScores;

#[derive(Debug, Clone)]
struct Slot {
    comment: Comment,
    parent: Option<usize>,
    replies: Vec<usize>,
    score: i64,
    viewer_vote: i16,
}

impl Slot {
    fn new(comment: Comment, parent: Option<usize>) -> Self {
        Self {
            comment,
            parent,
            replies: Vec::new(),
            score: 0,
            viewer_vote: 0,
        }
    }
}

/// Nested comment with its replies, as handed to the API layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub score: i64,
    /// The viewer's own vote, 0 when not voted or anonymous
    pub viewer_vote: i16,
    pub reply_count: usize,
    pub replies: Vec<CommentNode>,
}

// Freeing a nested reply chain recursively overflows the stack on deep threads.
impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.replies);
        }
    }
}

/// Reply forest of a single post
#[derive(Debug, Clone, Default)]
pub struct CommentTree {
    slots: Vec<Slot>,
    index: HashMap<Uuid, usize>,
    roots: Vec<usize>,
}

/// Build a reply forest from a flat comment list. See [`CommentTree::build`].
pub fn build_tree(flat_comments: Vec<Comment>) -> CommentTree {
    CommentTree::build(flat_comments)
}

impl CommentTree {
    /// Build the forest in O(n), keeping the input order among siblings.
    ///
    /// A comment whose parent is not part of the batch (or belongs to another
    /// post) is dropped together with everything beneath it; it is never
    /// promoted to a root. Repeated ids keep their first occurrence.
    pub fn build(flat_comments: Vec<Comment>) -> Self {
        let total = flat_comments.len();

        let mut position: HashMap<Uuid, usize> = HashMap::with_capacity(total);
        for (i, comment) in flat_comments.iter().enumerate() {
            position.entry(comment.id).or_insert(i);
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); total];
        let mut roots = Vec::new();
        for (i, comment) in flat_comments.iter().enumerate() {
            if position.get(&comment.id) != Some(&i) {
                continue;
            }
            match comment.parent_id {
                None => roots.push(i),
                Some(parent_id) => match position.get(&parent_id) {
                    Some(&p) if p != i && flat_comments[p].post_id == comment.post_id => {
                        children[p].push(i)
                    }
                    _ => {}
                },
            }
        }

        // Breadth-first from the roots: anything not reached is an orphan subtree.
        let mut order: Vec<usize> = Vec::with_capacity(total);
        let mut new_slot: Vec<Option<usize>> = vec![None; total];
        let mut queue: VecDeque<usize> = roots.iter().copied().collect();
        while let Some(old) = queue.pop_front() {
            new_slot[old] = Some(order.len());
            order.push(old);
            queue.extend(children[old].iter().copied());
        }

        let mut parent_of: Vec<Option<usize>> = vec![None; total];
        for (old, kids) in children.iter().enumerate() {
            for &kid in kids {
                parent_of[kid] = new_slot[old];
            }
        }

        let mut pending: Vec<Option<Comment>> = flat_comments.into_iter().map(Some).collect();
        let mut tree = CommentTree {
            slots: Vec::with_capacity(order.len()),
            index: HashMap::with_capacity(order.len()),
            roots: roots.iter().filter_map(|&r| new_slot[r]).collect(),
        };

        for &old in &order {
            let Some(comment) = pending[old].take() else {
                continue;
            };
            let mut slot = Slot::new(comment, parent_of[old]);
            slot.replies = children[old].iter().filter_map(|&c| new_slot[c]).collect();
            tree.index.insert(slot.comment.id, tree.slots.len());
            tree.slots.push(slot);
        }

        let dropped = total - tree.slots.len();
        if dropped > 0 {
            debug!(total, dropped, "Dropped comments without a reachable parent");
        }

        tree
    }

    /// Attach `reply` under `parent_id`, wherever that comment sits.
    ///
    /// Unlike orphans at build time, an unknown parent here is reported as
    /// `ParentNotFound` and the tree is left untouched.
    pub fn insert_reply(&mut self, parent_id: Uuid, reply: Comment) -> ServiceResult<()> {
        let parent = *self
            .index
            .get(&parent_id)
            .ok_or(ServiceError::ParentNotFound(parent_id))?;

        if reply.parent_id != Some(parent_id) {
            return Err(ServiceError::InvalidInput(format!(
                "comment {} does not reply to {}",
                reply.id, parent_id
            )));
        }
        if reply.post_id != self.slots[parent].comment.post_id {
            return Err(ServiceError::InvalidInput(format!(
                "comment {} belongs to another post than {}",
                reply.id, parent_id
            )));
        }
        self.ensure_new(reply.id)?;

        let slot = self.slots.len();
        self.index.insert(reply.id, slot);
        self.slots.push(Slot::new(reply, Some(parent)));
        self.slots[parent].replies.push(slot);
        Ok(())
    }

    /// Put a freshly created top-level comment in front of the existing roots.
    pub fn insert_root(&mut self, comment: Comment) -> ServiceResult<()> {
        if comment.parent_id.is_some() {
            return Err(ServiceError::InvalidInput(format!(
                "comment {} is a reply, not a root",
                comment.id
            )));
        }
        self.ensure_new(comment.id)?;

        let slot = self.slots.len();
        self.index.insert(comment.id, slot);
        self.slots.push(Slot::new(comment, None));
        self.roots.insert(0, slot);
        Ok(())
    }

    fn ensure_new(&self, comment_id: Uuid) -> ServiceResult<()> {
        if self.index.contains_key(&comment_id) {
            return Err(ServiceError::InvalidInput(format!(
                "comment {} is already in the tree",
                comment_id
            )));
        }
        Ok(())
    }

    /// Number of comments reachable from the roots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, comment_id: Uuid) -> bool {
        self.index.contains_key(&comment_id)
    }

    pub fn get(&self, comment_id: Uuid) -> Option<&Comment> {
        self.index.get(&comment_id).map(|&i| &self.slots[i].comment)
    }

    /// Root comment ids in display order
    pub fn root_ids(&self) -> Vec<Uuid> {
        self.roots
            .iter()
            .map(|&i| self.slots[i].comment.id)
            .collect()
    }

    /// Direct reply ids of a comment in display order
    pub fn reply_ids(&self, comment_id: Uuid) -> Option<Vec<Uuid>> {
        self.index.get(&comment_id).map(|&i| {
            self.slots[i]
                .replies
                .iter()
                .map(|&r| self.slots[r].comment.id)
                .collect()
        })
    }

    /// Distance from the root (roots are at depth 0)
    pub fn depth(&self, comment_id: Uuid) -> Option<usize> {
        let mut current = *self.index.get(&comment_id)?;
        let mut depth = 0;
        while let Some(parent) = self.slots[current].parent {
            depth += 1;
            current = parent;
        }
        Some(depth)
    }

    pub fn comment_ids(&self) -> Vec<Uuid> {
        self.slots.iter().map(|s| s.comment.id).collect()
    }

    /// Copy ledger scores (and the viewer's votes) onto every node.
    pub fn annotate(&mut self, scores: &TargetScores) {
        for slot in &mut self.slots {
            slot.score = scores.score(slot.comment.id);
            slot.viewer_vote = scores.viewer_vote(slot.comment.id);
        }
    }

    pub fn score(&self, comment_id: Uuid) -> Option<i64> {
        self.index.get(&comment_id).map(|&i| self.slots[i].score)
    }

    /// Nested view of the forest
    pub fn to_forest(&self) -> Vec<CommentNode> {
        let mut built: Vec<Option<CommentNode>> = vec![None; self.slots.len()];

        for i in (0..self.slots.len()).rev() {
            let slot = &self.slots[i];
            let replies: Vec<CommentNode> = slot
                .replies
                .iter()
                .filter_map(|&r| built[r].take())
                .collect();
            built[i] = Some(CommentNode {
                comment: slot.comment.clone(),
                score: slot.score,
                viewer_vote: slot.viewer_vote,
                reply_count: replies.len(),
                replies,
            });
        }

        self.roots.iter().filter_map(|&r| built[r].take()).collect()
    }
}
