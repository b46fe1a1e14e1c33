use crate::constants::TAG_TREE_UNKNOWN;
use crate::error::J2kError;
use crate::jpeg2000::bit_io::{J2kBitReader, J2kBitWriter};

/// Tag Tree for JPEG 2000 Packet Header coding (ISO/IEC 15444-1 B.10.2).
/// Represents a quad-tree structure used to encode 2D arrays of values (e.g. inclusion,
/// zero bit-planes).
#[derive(Debug, Clone, Default)]
pub struct TagTree {
    nodes: Vec<TagTreeNode>,
    leaf_width: usize,
    leaf_height: usize,
}

#[derive(Clone, Debug)]
struct TagTreeNode {
    value: i32,
    low: i32,
    known: bool,
    parent_index: Option<usize>,
}

impl Default for TagTreeNode {
    fn default() -> Self {
        Self {
            value: TAG_TREE_UNKNOWN,
            low: 0,
            known: false,
            parent_index: None,
        }
    }
}

impl TagTree {
    /// Create a new TagTree for a grid of `w` x `h` leaves. An empty grid has no nodes.
    pub fn new(w: usize, h: usize) -> Self {
        if w == 0 || h == 0 {
            return Self::default();
        }

        let mut nodes = vec![TagTreeNode::default(); w * h];
        let mut current_level_start = 0;
        let mut current_w = w;
        let mut current_h = h;

        while current_w > 1 || current_h > 1 {
            let next_w = current_w.div_ceil(2);
            let next_h = current_h.div_ceil(2);
            let next_level_start = nodes.len();
            nodes.resize(next_level_start + next_w * next_h, TagTreeNode::default());

            for y in 0..current_h {
                for x in 0..current_w {
                    let child_idx = current_level_start + y * current_w + x;
                    let parent_idx = next_level_start + (y / 2) * next_w + x / 2;
                    nodes[child_idx].parent_index = Some(parent_idx);
                }
            }

            current_w = next_w;
            current_h = next_h;
            current_level_start = next_level_start;
        }

        Self {
            nodes,
            leaf_width: w,
            leaf_height: h,
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.leaf_width * self.leaf_height
    }

    /// Reset every node to an unknown value.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.value = TAG_TREE_UNKNOWN;
            node.low = 0;
            node.known = false;
        }
    }

    /// Set the value of a leaf and lower every ancestor whose value is larger.
    pub fn set_value(&mut self, leaf: usize, value: i32) {
        let mut idx = Some(leaf);
        while let Some(i) = idx {
            let node = &mut self.nodes[i];
            if node.value <= value {
                break;
            }
            node.value = value;
            idx = node.parent_index;
        }
    }

    /// Decoded (or set) value of a leaf.
    pub fn value(&self, leaf: usize) -> i32 {
        self.nodes[leaf].value
    }

    /// Root-first path from the root down to `leaf`.
    fn path(&self, leaf: usize) -> Vec<usize> {
        let mut path = vec![leaf];
        let mut idx = leaf;
        while let Some(parent) = self.nodes[idx].parent_index {
            path.push(parent);
            idx = parent;
        }
        path.reverse();
        path
    }

    /// Emit the bits telling whether the leaf value is below `threshold`.
    pub fn encode_threshold(
        &mut self,
        writer: &mut J2kBitWriter,
        leaf: usize,
        threshold: i32,
    ) -> Result<(), J2kError> {
        let mut low = 0;
        for idx in self.path(leaf) {
            let node = &mut self.nodes[idx];
            if low > node.low {
                node.low = low;
            } else {
                low = node.low;
            }
            while low < threshold {
                if low >= node.value {
                    if !node.known {
                        writer.write_bit(1)?;
                        node.known = true;
                    }
                    break;
                }
                writer.write_bit(0)?;
                low += 1;
            }
            node.low = low;
        }
        Ok(())
    }

    /// Read bits until it is known whether the leaf value is below `threshold`.
    pub fn decode_threshold(
        &mut self,
        reader: &mut J2kBitReader,
        leaf: usize,
        threshold: i32,
    ) -> Result<bool, J2kError> {
        let mut low = 0;
        for idx in self.path(leaf) {
            let node = &mut self.nodes[idx];
            if low > node.low {
                node.low = low;
            } else {
                low = node.low;
            }
            while low < threshold && low < node.value {
                if reader.read_bit()? == 1 {
                    node.value = low;
                } else {
                    low += 1;
                }
            }
            node.low = low;
        }
        Ok(self.nodes[leaf].value < threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_tree_structure() {
        let tt = TagTree::new(3, 3);
        assert_eq!(tt.nodes.len(), 14);
        assert_eq!(tt.nodes[0].parent_index, Some(9));
        assert_eq!(tt.nodes[8].parent_index, Some(12));
        assert_eq!(tt.nodes[13].parent_index, None);

        assert_eq!(TagTree::new(1, 1).nodes.len(), 1);
        assert_eq!(TagTree::new(0, 4).num_leaves(), 0);
    }

    #[test]
    fn test_set_value_propagates_minimum() {
        let mut tt = TagTree::new(2, 2);
        tt.reset();
        tt.set_value(3, 4);
        tt.set_value(1, 2);
        assert_eq!(tt.nodes[4].value, 2);
        tt.set_value(0, 7);
        assert_eq!(tt.nodes[4].value, 2);
        assert_eq!(tt.value(0), 7);
    }

    #[test]
    fn test_tag_tree_values_roundtrip() {
        let values = [5, 2, 10, 0, 3, 3, 1, 8, 4];
        let mut encoder_tree = TagTree::new(3, 3);
        encoder_tree.reset();
        for (leaf, &v) in values.iter().enumerate() {
            encoder_tree.set_value(leaf, v);
        }

        let mut buffer = [0u8; 64];
        let mut writer = J2kBitWriter::new(&mut buffer);
        for leaf in 0..values.len() {
            encoder_tree.encode_threshold(&mut writer, leaf, TAG_TREE_UNKNOWN).unwrap();
        }
        writer.flush().unwrap();
        let written = writer.num_bytes();

        let mut decoder_tree = TagTree::new(3, 3);
        decoder_tree.reset();
        let mut reader = J2kBitReader::new(&buffer[..written]);
        for (leaf, &v) in values.iter().enumerate() {
            let mut i = 0;
            while !decoder_tree.decode_threshold(&mut reader, leaf, i).unwrap() {
                i += 1;
            }
            assert_eq!(i - 1, v);
            assert_eq!(decoder_tree.value(leaf), v);
        }
    }

    #[test]
    fn test_inclusion_style_thresholds() {
        // leaf 0 first included in layer 2, leaf 1 never, leaf 2 in layer 0
        let first_layer = [2, TAG_TREE_UNKNOWN, 0];
        let mut encoder_tree = TagTree::new(3, 1);
        encoder_tree.reset();

        let mut buffer = [0u8; 32];
        let mut writer = J2kBitWriter::new(&mut buffer);
        for layer in 0..4 {
            for (leaf, &first) in first_layer.iter().enumerate() {
                if first == layer {
                    encoder_tree.set_value(leaf, layer);
                }
            }
            for leaf in 0..3 {
                encoder_tree.encode_threshold(&mut writer, leaf, layer + 1).unwrap();
            }
        }
        writer.flush().unwrap();
        let written = writer.num_bytes();

        let mut decoder_tree = TagTree::new(3, 1);
        decoder_tree.reset();
        let mut reader = J2kBitReader::new(&buffer[..written]);
        for layer in 0..4 {
            for (leaf, &first) in first_layer.iter().enumerate() {
                let included = decoder_tree.decode_threshold(&mut reader, leaf, layer + 1).unwrap();
                assert_eq!(included, first <= layer, "leaf {leaf} layer {layer}");
            }
        }
    }
}
