use core::fmt;

/// Opaque integer name of a resource allocated on the graphics device.
///
/// Invariant: the raw value `0` ([`GpuHandle::NULL`]) always means "no resource".
/// Handles are plain data; ownership lives in the wrapper that allocated them
/// (`VertexBuffer`, `VertexArray`, `Shader`, ...).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct GpuHandle(u32);

impl GpuHandle {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GpuHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Texture name as carried by sprite commands.
pub type TextureId = GpuHandle;
