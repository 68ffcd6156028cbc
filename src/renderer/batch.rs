//! Per-frame vertex and index accumulation

use glam::{Vec2, Vec4};

use super::vertex::Vertex2D;

/// Vertices and indices concatenated from many shapes.
///
/// Every index refers to a vertex of the same batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    vertices: Vec<Vertex2D>,
    indices: Vec<u32>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the contents, keeping the allocations
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Append one shape's world vertices with `color` baked in.
    ///
    /// `indices` are local to `positions`; they are offset by the vertex
    /// count before the append. Returns `false` and appends nothing if an
    /// index points past `positions`.
    pub fn append(&mut self, positions: &[Vec2], color: Vec4, indices: &[u32]) -> bool {
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            log::error!(
                "Batch index {bad} out of range for {} vertices, shape skipped",
                positions.len()
            );
            return false;
        }
        if indices.is_empty() {
            return true;
        }

        let base = self.vertices.len() as u32;
        let color = color.to_array();
        self.vertices.extend(
            positions
                .iter()
                .map(|p| Vertex2D::new(p.to_array(), color, [0.0; 2])),
        );
        self.indices.extend(indices.iter().map(|&i| base + i));
        true
    }

    pub fn vertices(&self) -> &[Vertex2D] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: [Vec2; 4] = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];

    #[test]
    fn test_indices_are_offset_per_shape() {
        let mut batch = Batch::new();
        assert!(batch.append(&QUAD, Vec4::ONE, &[0, 1, 2, 0, 2, 3]));
        assert!(batch.append(&QUAD[..3], Vec4::ONE, &[0, 1, 2]));

        assert_eq!(batch.vertex_count(), 7);
        assert_eq!(batch.indices(), &[0, 1, 2, 0, 2, 3, 4, 5, 6]);
        assert!(batch
            .indices()
            .iter()
            .all(|&i| (i as usize) < batch.vertex_count()));
    }

    #[test]
    fn test_color_is_baked_into_vertices() {
        let mut batch = Batch::new();
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        batch.append(&QUAD[..3], red, &[0, 1, 2]);
        assert!(batch.vertices().iter().all(|v| v.color == red.to_array()));
        assert_eq!(batch.vertices()[1].position, [1.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_index_rejects_shape() {
        let mut batch = Batch::new();
        batch.append(&QUAD, Vec4::ONE, &[0, 1, 2]);

        assert!(!batch.append(&QUAD[..3], Vec4::ONE, &[0, 1, 3]));
        assert_eq!(batch.vertex_count(), 4);
        assert_eq!(batch.index_count(), 3);
    }

    #[test]
    fn test_clear_keeps_nothing() {
        let mut batch = Batch::new();
        batch.append(&QUAD, Vec4::ONE, &[0, 1, 2]);
        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch, Batch::new());
    }
}
