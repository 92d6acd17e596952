use std::collections::BTreeSet;

use gazette_shared::Comment;

/// Top-level comments newest first; each comment's replies oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadList {
    comments: Vec<Comment>,
}

impl ThreadList {
    pub fn new(comments: Vec<Comment>) -> Self {
        Self { comments }
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Comment> {
        self.comments.iter()
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }

    /// True if `id` is a top-level comment or a reply anywhere in the list.
    pub fn contains(&self, id: &str) -> bool {
        self.comments
            .iter()
            .any(|c| c.id == id || c.replies.iter().any(|r| r.id == id))
    }

    /// Ids of every comment and reply.
    pub fn comment_ids(&self) -> BTreeSet<String> {
        self.comments
            .iter()
            .flat_map(|c| std::iter::once(c).chain(c.replies.iter()))
            .map(|c| c.id.clone())
            .collect()
    }

    /// Puts `comment` at the head. Returns false if it is already present.
    pub fn prepend_comment(&mut self, comment: Comment) -> bool {
        if self.contains(&comment.id) {
            return false;
        }
        self.comments.insert(0, comment);
        true
    }

    /// Adds `reply` after the existing replies of `parent_id`. Returns false if
    /// the parent is unknown or the reply is already present.
    pub fn append_reply(&mut self, parent_id: &str, reply: Comment) -> bool {
        if self.contains(&reply.id) {
            return false;
        }
        match self.comments.iter_mut().find(|c| c.id == parent_id) {
            Some(parent) => {
                parent.replies.push(reply);
                true
            }
            None => false,
        }
    }
}

impl<'a> IntoIterator for &'a ThreadList {
    type Item = &'a Comment;
    type IntoIter = std::slice::Iter<'a, Comment>;

    fn into_iter(self) -> Self::IntoIter {
        self.comments.iter()
    }
}
