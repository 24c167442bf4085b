/// One acquired swapchain image.
///
/// Present it with [`Gpu::present`](super::Gpu::present) before asking for the
/// next one; an unreleased surface texture blocks further acquisition.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

impl GpuFrame {
    /// Size of the image in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        let t = &self.surface_texture.texture;
        (t.width(), t.height())
    }
}
