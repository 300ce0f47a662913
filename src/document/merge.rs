//! Merging images into galleries
//!
//! The editor merges by two clicks: the first arms an image or gallery, the
//! second picks the node to merge with. The selection is plain state owned by
//! whoever drives the interaction (one per editor session or request).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::layout::path_after_removal;
use super::{Document, DocumentError, GalleryLayout, Node, NodeKind};

/// Result of a click in merge mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Nothing was armed; the clicked node is now armed
    Armed { path: Vec<usize> },
    /// The armed node was clicked again
    Disarmed,
    /// Two nodes became one gallery, found at `gallery`
    Merged { gallery: Vec<usize> },
}

/// The armed node of a merge interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSelection {
    armed: Option<Vec<usize>>,
}

impl MergeSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed(&self) -> Option<&[usize]> {
        self.armed.as_deref()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Arm the image or gallery at `path`.
    pub fn arm(&mut self, doc: &Document, path: &[usize]) -> Result<(), DocumentError> {
        let node = doc
            .node_at(path)
            .ok_or_else(|| DocumentError::NodeNotFound(path.to_vec()))?;
        if path.is_empty() || !node.node_kind().is_mergeable() {
            return Err(DocumentError::WrongNodeType {
                path: path.to_vec(),
                expected: "an image or gallery",
                found: node.kind.clone(),
            });
        }
        self.armed = Some(path.to_vec());
        Ok(())
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    /// Handle a click on `target`.
    ///
    /// With nothing armed the target gets armed. Clicking the armed node
    /// disarms it. Otherwise the armed node and the target are merged into a
    /// single gallery and the selection is cleared. A target that is neither
    /// an image nor a gallery is rejected and the selection stays armed.
    pub fn click(&mut self, doc: &mut Document, target: &[usize]) -> Result<MergeOutcome, DocumentError> {
        let Some(armed) = self.armed.clone() else {
            self.arm(doc, target)?;
            return Ok(MergeOutcome::Armed {
                path: target.to_vec(),
            });
        };

        if armed == target {
            self.disarm();
            return Ok(MergeOutcome::Disarmed);
        }

        let armed_kind = match doc.node_at(&armed) {
            Some(node) if node.node_kind().is_mergeable() => node.node_kind(),
            Some(_) | None => {
                // Document changed under the selection
                self.disarm();
                return Err(DocumentError::NothingArmed);
            }
        };

        let target_node = doc
            .node_at(target)
            .ok_or_else(|| DocumentError::NodeNotFound(target.to_vec()))?;
        let target_kind = target_node.node_kind();
        if target.is_empty() || !target_kind.is_mergeable() {
            return Err(DocumentError::InvalidMergeTarget(target_node.kind.clone()));
        }

        let gallery = match (armed_kind, target_kind) {
            (NodeKind::Image, NodeKind::Image) => {
                let entries = vec![image_entry(doc, &armed)?, image_entry(doc, target)?];
                let mut gallery = Node::gallery(Vec::new(), GalleryLayout::Grid);
                gallery.set_gallery_entries(entries);
                doc.replace_node(target, gallery)?;
                doc.remove_node(&armed)?;
                path_after_removal(target, &armed)
            }
            (NodeKind::Image, NodeKind::ImageGallery) => {
                let entry = image_entry(doc, &armed)?;
                append_images(doc, target, vec![entry])?;
                doc.remove_node(&armed)?;
                path_after_removal(target, &armed)
            }
            (NodeKind::ImageGallery, NodeKind::Image) => {
                let entry = image_entry(doc, target)?;
                append_images(doc, &armed, vec![entry])?;
                doc.remove_node(target)?;
                path_after_removal(&armed, target)
            }
            (NodeKind::ImageGallery, NodeKind::ImageGallery) => {
                let entries = doc
                    .node_at(&armed)
                    .map(Node::gallery_entries)
                    .unwrap_or_default();
                append_images(doc, target, entries)?;
                doc.remove_node(&armed)?;
                path_after_removal(target, &armed)
            }
            _ => return Err(DocumentError::InvalidMergeTarget(target_node_kind(doc, target))),
        };

        self.disarm();
        Ok(MergeOutcome::Merged { gallery })
    }
}

fn image_entry(doc: &Document, path: &[usize]) -> Result<Value, DocumentError> {
    doc.node_at(path)
        .and_then(Node::image_entry)
        .ok_or_else(|| DocumentError::Invalid {
            path: path.to_vec(),
            message: "image requires a non-empty 'src'".into(),
        })
}

fn append_images(doc: &mut Document, gallery: &[usize], extra: Vec<Value>) -> Result<(), DocumentError> {
    let node = doc
        .node_at_mut(gallery)
        .ok_or_else(|| DocumentError::NodeNotFound(gallery.to_vec()))?;
    let mut entries = node.gallery_entries();
    entries.extend(extra);
    node.set_gallery_entries(entries);
    Ok(())
}

fn target_node_kind(doc: &Document, path: &[usize]) -> String {
    doc.node_at(path).map(|n| n.kind.clone()).unwrap_or_default()
}
