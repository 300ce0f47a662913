//! Structural edits on galleries and column blocks

use super::{Document, DocumentError, GalleryLayout, Node, NodeKind, MAX_COLUMNS, MIN_COLUMNS};
use serde_json::Value;

impl Document {
    /// Switch a gallery between grid and slideshow; returns the new layout.
    pub fn toggle_gallery_layout(&mut self, path: &[usize]) -> Result<GalleryLayout, DocumentError> {
        let node = self.expect_kind_mut(path, NodeKind::ImageGallery, "an image gallery")?;
        let layout = node.gallery_layout().toggled();
        node.attrs
            .insert("layout".into(), Value::String(layout.as_str().to_string()));
        Ok(layout)
    }

    /// Resize a `columns` block to `count` columns.
    ///
    /// New columns get an empty paragraph. When shrinking, the blocks of the
    /// dropped columns are appended to the last remaining column so no
    /// content is lost.
    pub fn set_column_count(&mut self, path: &[usize], count: usize) -> Result<(), DocumentError> {
        if !(MIN_COLUMNS..=MAX_COLUMNS).contains(&count) {
            return Err(DocumentError::InvalidColumnCount(count));
        }

        let node = self.expect_kind_mut(path, NodeKind::Columns, "a columns block")?;
        let current = node.content.len();

        if count > current {
            for _ in current..count {
                node.content
                    .push(Node::column(vec![Node::paragraph(Vec::new())]));
            }
        } else if count < current {
            let moved: Vec<Node> = node
                .content
                .drain(count..)
                .flat_map(|column| column.content)
                .filter(|block| !is_empty_paragraph(block))
                .collect();
            if let Some(last) = node.content.last_mut() {
                if last.content.len() == 1 && is_empty_paragraph(&last.content[0]) && !moved.is_empty() {
                    last.content.clear();
                }
                last.content.extend(moved);
            }
        }

        node.attrs.insert("count".into(), Value::from(count as u64));
        Ok(())
    }

    /// Insert a new `columns` block of `count` empty columns.
    ///
    /// `at` is the path the new block will occupy: its last index is the
    /// position among the parent's children. Returns that path.
    pub fn insert_columns(&mut self, at: &[usize], count: usize) -> Result<Vec<usize>, DocumentError> {
        if !(MIN_COLUMNS..=MAX_COLUMNS).contains(&count) {
            return Err(DocumentError::InvalidColumnCount(count));
        }
        let Some((&index, parent_path)) = at.split_last() else {
            return Err(DocumentError::NodeNotFound(at.to_vec()));
        };

        let parent = self
            .node_at_mut(parent_path)
            .ok_or_else(|| DocumentError::NodeNotFound(parent_path.to_vec()))?;

        if !matches!(
            parent.node_kind(),
            NodeKind::Doc | NodeKind::Blockquote | NodeKind::ListItem
        ) {
            return Err(DocumentError::WrongNodeType {
                path: parent_path.to_vec(),
                expected: "a block container",
                found: parent.kind.clone(),
            });
        }
        if index > parent.content.len() {
            return Err(DocumentError::NodeNotFound(at.to_vec()));
        }

        parent.content.insert(index, Node::columns(count));
        Ok(at.to_vec())
    }

    /// Remove the node at `path`.
    ///
    /// A column (or the document itself) left without blocks receives an
    /// empty paragraph.
    pub(crate) fn remove_node(&mut self, path: &[usize]) -> Result<Node, DocumentError> {
        let Some((&index, parent_path)) = path.split_last() else {
            return Err(DocumentError::NodeNotFound(path.to_vec()));
        };
        let parent = self
            .node_at_mut(parent_path)
            .ok_or_else(|| DocumentError::NodeNotFound(path.to_vec()))?;
        if index >= parent.content.len() {
            return Err(DocumentError::NodeNotFound(path.to_vec()));
        }

        let removed = parent.content.remove(index);
        if parent.content.is_empty()
            && matches!(parent.node_kind(), NodeKind::Column | NodeKind::Doc)
        {
            parent.content.push(Node::paragraph(Vec::new()));
        }
        Ok(removed)
    }

    pub(crate) fn replace_node(&mut self, path: &[usize], node: Node) -> Result<Node, DocumentError> {
        if path.is_empty() {
            return Err(DocumentError::NodeNotFound(Vec::new()));
        }
        let slot = self
            .node_at_mut(path)
            .ok_or_else(|| DocumentError::NodeNotFound(path.to_vec()))?;
        Ok(std::mem::replace(slot, node))
    }

    fn expect_kind_mut(
        &mut self,
        path: &[usize],
        kind: NodeKind,
        expected: &'static str,
    ) -> Result<&mut Node, DocumentError> {
        let node = self
            .node_at_mut(path)
            .ok_or_else(|| DocumentError::NodeNotFound(path.to_vec()))?;
        if node.node_kind() != kind {
            return Err(DocumentError::WrongNodeType {
                path: path.to_vec(),
                expected,
                found: node.kind.clone(),
            });
        }
        Ok(node)
    }
}

/// Where `path` points after the node at `removed` is taken out.
///
/// Only later siblings of the removed node (and their descendants) move.
pub(crate) fn path_after_removal(path: &[usize], removed: &[usize]) -> Vec<usize> {
    let mut adjusted = path.to_vec();
    if let Some((&removed_index, removed_parent)) = removed.split_last() {
        let depth = removed_parent.len();
        if path.len() > depth && path[..depth] == *removed_parent && path[depth] > removed_index {
            adjusted[depth] -= 1;
        }
    }
    adjusted
}

fn is_empty_paragraph(node: &Node) -> bool {
    node.node_kind() == NodeKind::Paragraph && node.content.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::sample;
    use proptest::prelude::*;

    #[test]
    fn test_toggle_gallery_layout() {
        let mut doc = sample();
        assert_eq!(doc.toggle_gallery_layout(&[3]).unwrap(), GalleryLayout::Slideshow);
        assert_eq!(doc.node_at(&[3]).unwrap().attr_str("layout"), Some("slideshow"));
        assert_eq!(doc.toggle_gallery_layout(&[3]).unwrap(), GalleryLayout::Grid);
    }

    #[test]
    fn test_toggle_requires_gallery() {
        let mut doc = sample();
        assert!(matches!(
            doc.toggle_gallery_layout(&[2]),
            Err(DocumentError::WrongNodeType { .. })
        ));
        assert!(matches!(
            doc.toggle_gallery_layout(&[42]),
            Err(DocumentError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_grow_columns() {
        let mut doc = sample();
        doc.set_column_count(&[4], 4).unwrap();

        let columns = doc.node_at(&[4]).unwrap();
        assert_eq!(columns.column_count(), 4);
        assert_eq!(columns.content.len(), 4);
        assert_eq!(columns.content[3].content[0].kind, "paragraph");
        doc.validate().unwrap();
    }

    #[test]
    fn test_shrink_columns_keeps_content() {
        let mut doc = sample();
        doc.set_column_count(&[4], 4).unwrap();
        doc.set_column_count(&[4], 2).unwrap();
        let columns = doc.node_at(&[4]).unwrap();
        assert_eq!(columns.content.len(), 2);
        // Empty paragraphs of dropped columns are not carried over
        assert_eq!(columns.content[1].content.len(), 1);

        let mut doc = sample();
        doc.set_column_count(&[4], 3).unwrap();
        let before = doc.images();
        // Move the image column last, then shrink so it gets merged away
        let node = doc.node_at_mut(&[4]).unwrap();
        node.content.swap(0, 2);
        doc.set_column_count(&[4], 2).unwrap();
        assert_eq!(doc.images(), before);
        doc.validate().unwrap();
    }

    #[test]
    fn test_column_count_bounds() {
        let mut doc = sample();
        assert_eq!(
            doc.set_column_count(&[4], 1),
            Err(DocumentError::InvalidColumnCount(1))
        );
        assert_eq!(
            doc.set_column_count(&[4], 5),
            Err(DocumentError::InvalidColumnCount(5))
        );
        assert!(doc.set_column_count(&[2], 3).is_err());
    }

    #[test]
    fn test_insert_columns() {
        let mut doc = sample();
        let path = doc.insert_columns(&[1], 3).unwrap();
        assert_eq!(path, vec![1]);
        assert_eq!(doc.node_at(&[1]).unwrap().column_count(), 3);
        assert_eq!(doc.node_at(&[2]).unwrap().kind, "paragraph");
        doc.validate().unwrap();

        let end = doc.blocks().len();
        assert!(doc.insert_columns(&[end], 2).is_ok());
        assert!(doc.insert_columns(&[end + 5], 2).is_err());
    }

    #[test]
    fn test_insert_columns_not_inside_columns() {
        let mut doc = sample();
        assert!(matches!(
            doc.insert_columns(&[4, 0, 0], 2),
            Err(DocumentError::WrongNodeType { .. })
        ));
    }

    #[test]
    fn test_remove_last_block_of_column_leaves_paragraph() {
        let mut doc = sample();
        let removed = doc.remove_node(&[4, 0, 0]).unwrap();
        assert_eq!(removed.kind, "image");
        let column = doc.node_at(&[4, 0]).unwrap();
        assert_eq!(column.content.len(), 1);
        assert!(is_empty_paragraph(&column.content[0]));
        doc.validate().unwrap();
    }

    #[test]
    fn test_path_after_removal() {
        assert_eq!(path_after_removal(&[3], &[1]), vec![2]);
        assert_eq!(path_after_removal(&[0], &[1]), vec![0]);
        assert_eq!(path_after_removal(&[4, 1, 0], &[2]), vec![3, 1, 0]);
        assert_eq!(path_after_removal(&[4, 1, 0], &[4, 0, 0]), vec![4, 1, 0]);
        assert_eq!(path_after_removal(&[4, 0, 2], &[4, 0, 1]), vec![4, 0, 1]);
    }

    proptest! {
        #[test]
        fn resizing_columns_never_loses_images(sizes in proptest::collection::vec(2usize..=4, 1..6)) {
            let mut doc = sample();
            let before = doc.images();
            for size in sizes {
                doc.set_column_count(&[4], size).unwrap();
                prop_assert!(doc.validate().is_ok());
            }
            prop_assert_eq!(doc.images(), before);
        }
    }
}
