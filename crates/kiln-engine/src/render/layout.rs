//! Vertex attribute layout description.
//!
//! A layout is pure data: it owns no GPU resource. Attribute order defines both
//! the binding slot (relative to the vertex array's slot counter) and the byte
//! offset inside one interleaved vertex.

/// Semantic type of one vertex attribute.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AttributeType {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
}

impl AttributeType {
    /// Number of 32-bit components (1–4).
    pub const fn components(self) -> u32 {
        match self {
            AttributeType::Float | AttributeType::Int => 1,
            AttributeType::Float2 | AttributeType::Int2 => 2,
            AttributeType::Float3 | AttributeType::Int3 => 3,
            AttributeType::Float4 | AttributeType::Int4 => 4,
        }
    }

    /// Size in bytes of one attribute value.
    pub const fn size(self) -> usize {
        self.components() as usize * 4
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            AttributeType::Int | AttributeType::Int2 | AttributeType::Int3 | AttributeType::Int4
        )
    }
}

/// One named attribute inside a [`VertexLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    pub name: String,
    pub ty: AttributeType,
    pub normalized: bool,
    offset: usize,
}

impl VertexAttribute {
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            normalized: false,
            offset: 0,
        }
    }

    /// Marks integer data as normalized to `[0, 1]` / `[-1, 1]` on fetch.
    pub fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }

    /// Byte offset inside one vertex; assigned by [`VertexLayout`].
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.ty.size()
    }
}

/// Ordered, interleaved attribute layout.
///
/// Invariant: `stride == sum(attribute sizes)` and each attribute's offset is the
/// sum of the sizes before it. Both are computed once on construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride: usize,
}

impl VertexLayout {
    pub fn new(attributes: impl IntoIterator<Item = VertexAttribute>) -> Self {
        let mut stride = 0usize;
        let attributes = attributes
            .into_iter()
            .map(|mut a| {
                a.offset = stride;
                stride += a.size();
                a
            })
            .collect();

        Self { attributes, stride }
    }

    /// Appends one attribute after the existing ones.
    pub fn with(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        let mut attr = VertexAttribute::new(name, ty);
        attr.offset = self.stride;
        self.stride += attr.size();
        self.attributes.push(attr);
        self
    }

    #[inline]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_sum_of_sizes_in_order() {
        let layout = VertexLayout::new([
            VertexAttribute::new("a_pos", AttributeType::Float3),
            VertexAttribute::new("a_uv", AttributeType::Float2),
            VertexAttribute::new("a_id", AttributeType::Int),
            VertexAttribute::new("a_color", AttributeType::Float4),
        ]);

        assert_eq!(layout.stride(), 12 + 8 + 4 + 16);

        let offsets: Vec<usize> = layout.attributes().iter().map(|a| a.offset()).collect();
        assert_eq!(offsets, vec![0, 12, 20, 24]);
    }

    #[test]
    fn offsets_are_strictly_increasing_and_non_overlapping() {
        let layout = VertexLayout::default()
            .with("a", AttributeType::Float)
            .with("b", AttributeType::Int4)
            .with("c", AttributeType::Float2);

        for pair in layout.attributes().windows(2) {
            assert!(pair[0].offset() < pair[1].offset());
            assert_eq!(pair[0].offset() + pair[0].size(), pair[1].offset());
        }
        assert_eq!(layout.stride(), 4 + 16 + 8);
    }

    #[test]
    fn empty_layout_has_zero_stride() {
        let layout = VertexLayout::new([]);
        assert!(layout.is_empty());
        assert_eq!(layout.stride(), 0);
    }

    #[test]
    fn normalized_flag_is_carried() {
        let attr = VertexAttribute::new("a_color", AttributeType::Int4).normalized();
        assert!(attr.normalized);
        assert!(attr.ty.is_integer());
    }
}
