//! Vertex and vertex layout definitions

use bytemuck::{Pod, Zeroable};

/// Semantic type of a single vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Float,
    Float2,
    Float3,
    Float4,
}

impl AttributeType {
    /// Number of `f32` components
    #[must_use]
    pub const fn components(self) -> usize {
        match self {
            Self::Float => 1,
            Self::Float2 => 2,
            Self::Float3 => 3,
            Self::Float4 => 4,
        }
    }

    /// Size in bytes
    #[must_use]
    pub const fn size(self) -> usize {
        self.components() * std::mem::size_of::<f32>()
    }

    /// Matching wgpu vertex format
    #[must_use]
    pub const fn wgpu_format(self) -> wgpu::VertexFormat {
        match self {
            Self::Float => wgpu::VertexFormat::Float32,
            Self::Float2 => wgpu::VertexFormat::Float32x2,
            Self::Float3 => wgpu::VertexFormat::Float32x3,
            Self::Float4 => wgpu::VertexFormat::Float32x4,
        }
    }
}

/// One attribute of an interleaved vertex buffer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub ty: AttributeType,
    pub name: String,
    /// Byte offset inside one vertex
    pub offset: usize,
}

/// Interleaved vertex buffer layout.
///
/// Built from an ordered list of `(type, name)` pairs. Offsets follow the
/// declaration order with no padding, and attribute `i` is bound to shader
/// location `i`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride: usize,
}

impl VertexLayout {
    /// Build a layout from ordered `(type, name)` pairs
    pub fn new(elements: &[(AttributeType, &str)]) -> Self {
        let mut offset = 0;
        let attributes = elements
            .iter()
            .map(|&(ty, name)| {
                let attribute = VertexAttribute {
                    ty,
                    name: name.to_owned(),
                    offset,
                };
                offset += ty.size();
                attribute
            })
            .collect();

        Self {
            attributes,
            stride: offset,
        }
    }

    /// Size of one vertex in bytes
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Attributes in declaration order
    #[must_use]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Find an attribute by name
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Number of whole vertices in `bytes`
    #[must_use]
    pub fn vertex_count(&self, bytes: usize) -> u32 {
        if self.stride == 0 {
            0
        } else {
            (bytes / self.stride) as u32
        }
    }

    /// wgpu attribute descriptors, shader location = declaration index
    pub fn wgpu_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        self.attributes
            .iter()
            .enumerate()
            .map(|(location, a)| wgpu::VertexAttribute {
                offset: a.offset as wgpu::BufferAddress,
                shader_location: location as u32,
                format: a.ty.wgpu_format(),
            })
            .collect()
    }
}

/// Vertex used by shapes and batches: position, color and texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex2D {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex2D {
    /// Create a new vertex
    pub const fn new(position: [f32; 2], color: [f32; 4], uv: [f32; 2]) -> Self {
        Self {
            position,
            color,
            uv,
        }
    }

    /// Layout matching `shape.wgsl`
    pub fn layout() -> VertexLayout {
        VertexLayout::new(&[
            (AttributeType::Float2, "a_position"),
            (AttributeType::Float4, "a_color"),
            (AttributeType::Float2, "a_uv"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets_and_stride() {
        let layout = Vertex2D::layout();

        assert_eq!(layout.stride(), std::mem::size_of::<Vertex2D>());
        let offsets: Vec<usize> = layout.attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 8, 24]);
        assert_eq!(layout.attribute("a_uv").map(|a| a.ty), Some(AttributeType::Float2));
        assert!(layout.attribute("a_normal").is_none());
    }

    #[test]
    fn test_layout_vertex_count() {
        let layout = VertexLayout::new(&[(AttributeType::Float3, "a_position")]);
        assert_eq!(layout.stride(), 12);
        assert_eq!(layout.vertex_count(36), 3);
        assert_eq!(layout.vertex_count(40), 3);
    }

    #[test]
    fn test_wgpu_attributes_use_declaration_order() {
        let attrs = Vertex2D::layout().wgpu_attributes();
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[1].shader_location, 1);
        assert_eq!(attrs[1].format, wgpu::VertexFormat::Float32x4);
        assert_eq!(attrs[2].offset, 24);
    }
}
