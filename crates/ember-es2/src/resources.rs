//! Driver-resource stores: textures, vertex/index buffers, surfaces.
//!
//! The engine holds opaque handles; driver names live in these stores and
//! are only touched on the thread that owns the context. Every resource can
//! drop its driver objects on suspend and rebuild them on resume;
//! uncompressed textures and buffers keep a CPU backing copy for that,
//! which also services lock/unlock without driver round trips.

use bitflags::bitflags;
use ember_gl::{consts, GlEs2};
use hashbrown::HashMap;
use tracing::warn;

use crate::format::{PixelFormat, PixelFormatTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferHandle(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferHandle(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub(crate) u32);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TextureUsage: u32 {
        const RENDER_TARGET        = 1 << 0;
        const DEPTH_STENCIL        = 1 << 1;
        /// Lightmap sub-kind; binding one latches the shader manager into
        /// the texture-lit permutation family.
        const LIGHTMAP             = 1 << 2;
        const DIRECTIONAL_LIGHTMAP = 1 << 3;
    }
}

#[derive(Debug)]
pub struct Texture2d {
    pub(crate) name: u32,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub usage: TextureUsage,
    /// Mip 0 CPU copy for restore across context loss. Compressed and
    /// render-target textures are not restorable; their content is
    /// re-streamed or re-rendered by the engine.
    backing: Option<Vec<u8>>,
    locked: bool,
    /// Sampler parameters last pushed for this texture object.
    pub(crate) last_sampler: Option<crate::state::SamplerStateDesc>,
}

impl Texture2d {
    pub fn driver_name(&self) -> u32 {
        self.name
    }
}

#[derive(Debug)]
pub struct VertexBuffer {
    pub(crate) name: u32,
    pub size: usize,
    pub dynamic: bool,
    backing: Option<Vec<u8>>,
}

impl VertexBuffer {
    pub fn driver_name(&self) -> u32 {
        self.name
    }
}

#[derive(Debug)]
pub struct IndexBuffer {
    pub(crate) name: u32,
    pub size: usize,
    /// `UNSIGNED_SHORT` or `UNSIGNED_INT`.
    pub index_type: u32,
    backing: Option<Vec<u8>>,
}

impl IndexBuffer {
    pub fn driver_name(&self) -> u32 {
        self.name
    }
}

/// A render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// The platform back buffer; `renderbuffer == 0` means the default
    /// framebuffer itself.
    DefaultColor { renderbuffer: u32 },
    /// A platform-provided default depth buffer.
    DefaultDepth { renderbuffer: u32 },
    /// Color attachment backed by a texture.
    TextureColor { texture: TextureHandle },
    /// Depth/stencil attachment backed by a depth texture.
    TextureDepth { texture: TextureHandle },
    /// Depth renderbuffer the RHI allocated itself.
    AllocatedDepth { renderbuffer: u32 },
    /// Secondary-viewport stand-in; never attached to an FBO.
    Placeholder,
}

#[derive(Debug)]
pub struct Surface {
    pub(crate) id: u32,
    pub kind: SurfaceKind,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub resolve_texture: Option<TextureHandle>,
}

impl Surface {
    /// Nonzero id used in framebuffer keys.
    pub fn unique_id(&self) -> u32 {
        self.id
    }

    pub fn is_default_color(&self) -> bool {
        matches!(self.kind, SurfaceKind::DefaultColor { .. })
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, SurfaceKind::Placeholder)
    }
}

#[derive(Debug, Default)]
pub struct ResourceStores {
    textures: HashMap<u32, Texture2d>,
    vertex_buffers: HashMap<u32, VertexBuffer>,
    index_buffers: HashMap<u32, IndexBuffer>,
    surfaces: HashMap<u32, Surface>,
    next_id: u32,
}

impl ResourceStores {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    // -----------------------------------------------------------------
    // Textures
    // -----------------------------------------------------------------

    pub fn create_texture_2d(
        &mut self,
        gl: &dyn GlEs2,
        formats: &PixelFormatTable,
        format: PixelFormat,
        width: u32,
        height: u32,
        mip_count: u32,
        usage: TextureUsage,
        initial_data: Option<&[u8]>,
    ) -> TextureHandle {
        let restorable = !format.is_compressed()
            && !format.is_depth()
            && !usage.contains(TextureUsage::RENDER_TARGET);
        let backing = if restorable {
            Some(match initial_data {
                Some(data) => data.to_vec(),
                None => vec![0u8; formats.info(format).mip_bytes(width, height)],
            })
        } else {
            None
        };

        let mut texture = Texture2d {
            name: 0,
            format,
            width,
            height,
            mip_count: mip_count.max(1),
            usage,
            backing,
            locked: false,
            last_sampler: None,
        };
        realize_texture(gl, formats, &mut texture, initial_data);

        let id = self.alloc_id();
        self.textures.insert(id, texture);
        TextureHandle(id)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture2d> {
        self.textures.get(&handle.0)
    }

    pub(crate) fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut Texture2d> {
        self.textures.get_mut(&handle.0)
    }

    pub fn destroy_texture(&mut self, gl: &dyn GlEs2, handle: TextureHandle) {
        if let Some(texture) = self.textures.remove(&handle.0) {
            if texture.name != 0 {
                gl.delete_texture(texture.name);
            }
        }
    }

    /// Begin a CPU-side edit of mip 0. Returns the staging bytes; write the
    /// new contents in place and call [`unlock_texture`](Self::unlock_texture).
    pub fn lock_texture(&mut self, handle: TextureHandle) -> Option<&mut [u8]> {
        let texture = self.textures.get_mut(&handle.0)?;
        let backing = texture.backing.as_mut()?;
        debug_assert!(!texture.locked, "texture locked twice");
        texture.locked = true;
        Some(backing.as_mut_slice())
    }

    /// Upload the edited backing to the driver.
    pub fn unlock_texture(
        &mut self,
        gl: &dyn GlEs2,
        formats: &PixelFormatTable,
        handle: TextureHandle,
    ) {
        let Some(texture) = self.textures.get_mut(&handle.0) else {
            return;
        };
        if !texture.locked {
            warn!("unlock_texture without a matching lock");
            return;
        }
        texture.locked = false;
        if texture.name == 0 {
            return;
        }
        let info = formats.info(texture.format);
        if let Some(backing) = &texture.backing {
            gl.bind_texture(consts::TEXTURE_2D, texture.name);
            gl.tex_sub_image_2d(
                consts::TEXTURE_2D,
                0,
                0,
                0,
                texture.width as i32,
                texture.height as i32,
                info.format,
                info.ty,
                backing,
            );
        }
    }

    // -----------------------------------------------------------------
    // Buffers
    // -----------------------------------------------------------------

    pub fn create_vertex_buffer(
        &mut self,
        gl: &dyn GlEs2,
        size: usize,
        initial_data: Option<&[u8]>,
        dynamic: bool,
    ) -> VertexBufferHandle {
        let name = gl.gen_buffer();
        gl.bind_buffer(consts::ARRAY_BUFFER, name);
        gl.buffer_data(
            consts::ARRAY_BUFFER,
            size,
            initial_data,
            if dynamic { consts::DYNAMIC_DRAW } else { consts::STATIC_DRAW },
        );
        let id = self.alloc_id();
        self.vertex_buffers.insert(
            id,
            VertexBuffer { name, size, dynamic, backing: initial_data.map(<[u8]>::to_vec) },
        );
        VertexBufferHandle(id)
    }

    pub fn vertex_buffer(&self, handle: VertexBufferHandle) -> Option<&VertexBuffer> {
        self.vertex_buffers.get(&handle.0)
    }

    pub fn destroy_vertex_buffer(&mut self, gl: &dyn GlEs2, handle: VertexBufferHandle) {
        if let Some(buffer) = self.vertex_buffers.remove(&handle.0) {
            if buffer.name != 0 {
                gl.delete_buffer(buffer.name);
            }
        }
    }

    /// Replace a byte range. Maps to `glBufferSubData`; drivers without
    /// `GL_OES_mapbuffer` take the same path, so callers never branch.
    pub fn update_vertex_buffer(
        &mut self,
        gl: &dyn GlEs2,
        handle: VertexBufferHandle,
        offset: usize,
        data: &[u8],
    ) {
        let Some(buffer) = self.vertex_buffers.get_mut(&handle.0) else {
            return;
        };
        debug_assert!(offset + data.len() <= buffer.size);
        if buffer.name != 0 {
            gl.bind_buffer(consts::ARRAY_BUFFER, buffer.name);
            gl.buffer_sub_data(consts::ARRAY_BUFFER, offset, data);
        }
        if let Some(backing) = &mut buffer.backing {
            backing[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    pub fn create_index_buffer(
        &mut self,
        gl: &dyn GlEs2,
        size: usize,
        index_type: u32,
        initial_data: Option<&[u8]>,
        dynamic: bool,
    ) -> IndexBufferHandle {
        let name = gl.gen_buffer();
        gl.bind_buffer(consts::ELEMENT_ARRAY_BUFFER, name);
        gl.buffer_data(
            consts::ELEMENT_ARRAY_BUFFER,
            size,
            initial_data,
            if dynamic { consts::DYNAMIC_DRAW } else { consts::STATIC_DRAW },
        );
        let id = self.alloc_id();
        self.index_buffers.insert(
            id,
            IndexBuffer { name, size, index_type, backing: initial_data.map(<[u8]>::to_vec) },
        );
        IndexBufferHandle(id)
    }

    pub fn index_buffer(&self, handle: IndexBufferHandle) -> Option<&IndexBuffer> {
        self.index_buffers.get(&handle.0)
    }

    pub fn destroy_index_buffer(&mut self, gl: &dyn GlEs2, handle: IndexBufferHandle) {
        if let Some(buffer) = self.index_buffers.remove(&handle.0) {
            if buffer.name != 0 {
                gl.delete_buffer(buffer.name);
            }
        }
    }

    // -----------------------------------------------------------------
    // Surfaces
    // -----------------------------------------------------------------

    pub fn create_surface(
        &mut self,
        kind: SurfaceKind,
        width: u32,
        height: u32,
        samples: u32,
        resolve_texture: Option<TextureHandle>,
    ) -> SurfaceHandle {
        let id = self.alloc_id();
        self.surfaces
            .insert(id, Surface { id, kind, width, height, samples, resolve_texture });
        SurfaceHandle(id)
    }

    pub fn surface(&self, handle: SurfaceHandle) -> Option<&Surface> {
        self.surfaces.get(&handle.0)
    }

    pub fn destroy_surface(&mut self, gl: &dyn GlEs2, handle: SurfaceHandle) {
        if let Some(surface) = self.surfaces.remove(&handle.0) {
            if let SurfaceKind::AllocatedDepth { renderbuffer } = surface.kind {
                if renderbuffer != 0 {
                    gl.delete_renderbuffer(renderbuffer);
                }
            }
        }
    }

    /// Driver texture name behind a surface attachment, if any.
    pub fn surface_texture_name(&self, surface: &Surface) -> Option<u32> {
        match surface.kind {
            SurfaceKind::TextureColor { texture } | SurfaceKind::TextureDepth { texture } => {
                self.texture(texture).map(|t| t.name)
            }
            _ => None,
        }
    }

    // -----------------------------------------------------------------
    // Context loss
    // -----------------------------------------------------------------

    /// Drop every driver object but keep logical state and CPU backing.
    pub fn release_gpu_resources(&mut self, gl: &dyn GlEs2) {
        for texture in self.textures.values_mut() {
            if texture.name != 0 {
                gl.delete_texture(texture.name);
                texture.name = 0;
            }
            texture.last_sampler = None;
        }
        for buffer in self.vertex_buffers.values_mut() {
            if buffer.name != 0 {
                gl.delete_buffer(buffer.name);
                buffer.name = 0;
            }
        }
        for buffer in self.index_buffers.values_mut() {
            if buffer.name != 0 {
                gl.delete_buffer(buffer.name);
                buffer.name = 0;
            }
        }
        for surface in self.surfaces.values_mut() {
            if let SurfaceKind::AllocatedDepth { renderbuffer } = &mut surface.kind {
                if *renderbuffer != 0 {
                    gl.delete_renderbuffer(*renderbuffer);
                    *renderbuffer = 0;
                }
            }
        }
    }

    /// Recreate driver objects after a resume, uploading CPU backing where
    /// it exists.
    pub fn reinit_gpu_resources(&mut self, gl: &dyn GlEs2, formats: &PixelFormatTable) {
        for texture in self.textures.values_mut() {
            let initial = texture.backing.take();
            realize_texture(gl, formats, texture, initial.as_deref());
            texture.backing = initial;
        }
        for buffer in self.vertex_buffers.values_mut() {
            buffer.name = gl.gen_buffer();
            gl.bind_buffer(consts::ARRAY_BUFFER, buffer.name);
            gl.buffer_data(
                consts::ARRAY_BUFFER,
                buffer.size,
                buffer.backing.as_deref(),
                if buffer.dynamic { consts::DYNAMIC_DRAW } else { consts::STATIC_DRAW },
            );
        }
        for buffer in self.index_buffers.values_mut() {
            buffer.name = gl.gen_buffer();
            gl.bind_buffer(consts::ELEMENT_ARRAY_BUFFER, buffer.name);
            gl.buffer_data(
                consts::ELEMENT_ARRAY_BUFFER,
                buffer.size,
                buffer.backing.as_deref(),
                consts::STATIC_DRAW,
            );
        }
        for surface in self.surfaces.values_mut() {
            if let SurfaceKind::AllocatedDepth { renderbuffer } = &mut surface.kind {
                let name = gl.gen_renderbuffer();
                gl.bind_renderbuffer(name);
                gl.renderbuffer_storage(
                    formats.depth_renderbuffer_format(),
                    surface.width as i32,
                    surface.height as i32,
                );
                *renderbuffer = name;
            }
        }
    }
}

fn realize_texture(
    gl: &dyn GlEs2,
    formats: &PixelFormatTable,
    texture: &mut Texture2d,
    initial_data: Option<&[u8]>,
) {
    let info = formats.info(texture.format);
    if !info.supported {
        warn!(format = ?texture.format, "texture format unsupported on this device");
    }
    texture.name = gl.gen_texture();
    gl.bind_texture(consts::TEXTURE_2D, texture.name);
    gl.pixel_store_i(consts::UNPACK_ALIGNMENT, 1);

    // Upload mips front-to-back; data is tightly packed in mip order.
    let mut offset = 0usize;
    let mut width = texture.width;
    let mut height = texture.height;
    for mip in 0..texture.mip_count {
        let bytes = info.mip_bytes(width, height);
        let mip_data = initial_data.and_then(|data| data.get(offset..offset + bytes));
        if info.compressed {
            if let Some(data) = mip_data {
                gl.compressed_tex_image_2d(
                    consts::TEXTURE_2D,
                    mip as i32,
                    info.internal_format,
                    width as i32,
                    height as i32,
                    data,
                );
            }
        } else {
            gl.tex_image_2d(
                consts::TEXTURE_2D,
                mip as i32,
                info.internal_format,
                width as i32,
                height as i32,
                info.format,
                info.ty,
                mip_data,
            );
        }
        offset += bytes;
        width = (width / 2).max(1);
        height = (height / 2).max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::DeviceCapabilities;
    use ember_gl::{GlCall, TraceGl};

    fn table(gl: &TraceGl) -> PixelFormatTable {
        PixelFormatTable::build(&DeviceCapabilities::probe(gl))
    }

    #[test]
    fn texture_lock_round_trips_through_backing() {
        let gl = TraceGl::new();
        let formats = table(&gl);
        let mut stores = ResourceStores::new();
        let handle = stores.create_texture_2d(
            &gl,
            &formats,
            PixelFormat::Rgba8,
            4,
            4,
            1,
            TextureUsage::empty(),
            None,
        );

        let pattern: Vec<u8> = (0..64).collect();
        stores.lock_texture(handle).unwrap().copy_from_slice(&pattern);
        stores.unlock_texture(&gl, &formats, handle);

        assert_eq!(stores.lock_texture(handle).unwrap(), pattern.as_slice());
        stores.unlock_texture(&gl, &formats, handle);
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::TexSubImage2d { .. })), 2);
    }

    #[test]
    fn release_and_reinit_assign_fresh_names_and_keep_data() {
        let gl = TraceGl::new();
        let formats = table(&gl);
        let mut stores = ResourceStores::new();
        let pattern: Vec<u8> = (0..64).rev().collect();
        let handle = stores.create_texture_2d(
            &gl,
            &formats,
            PixelFormat::Rgba8,
            4,
            4,
            1,
            TextureUsage::empty(),
            Some(&pattern),
        );
        let old_name = stores.texture(handle).unwrap().driver_name();

        stores.release_gpu_resources(&gl);
        assert_eq!(stores.texture(handle).unwrap().driver_name(), 0);
        stores.reinit_gpu_resources(&gl, &formats);

        let new_name = stores.texture(handle).unwrap().driver_name();
        assert_ne!(new_name, 0);
        assert_ne!(new_name, old_name);
        assert_eq!(stores.lock_texture(handle).unwrap(), pattern.as_slice());
    }

    #[test]
    fn compressed_textures_have_no_backing() {
        let gl = TraceGl::new();
        let formats = table(&gl);
        let mut stores = ResourceStores::new();
        let data = vec![0u8; formats.info(PixelFormat::Dxt1).mip_bytes(8, 8)];
        let handle = stores.create_texture_2d(
            &gl,
            &formats,
            PixelFormat::Dxt1,
            8,
            8,
            1,
            TextureUsage::empty(),
            Some(&data),
        );
        assert!(stores.lock_texture(handle).is_none());
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::CompressedTexImage2d { .. })), 1);
    }

    #[test]
    fn mip_chain_uploads_every_level() {
        let gl = TraceGl::new();
        let formats = table(&gl);
        let mut stores = ResourceStores::new();
        stores.create_texture_2d(
            &gl,
            &formats,
            PixelFormat::Rgba8,
            8,
            8,
            4,
            TextureUsage::empty(),
            None,
        );
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::TexImage2d { .. })), 4);
    }

    #[test]
    fn buffer_update_patches_backing_for_restore() {
        let gl = TraceGl::new();
        let formats = table(&gl);
        let mut stores = ResourceStores::new();
        let handle = stores.create_vertex_buffer(&gl, 8, Some(&[0u8; 8]), false);
        stores.update_vertex_buffer(&gl, handle, 4, &[9, 9, 9, 9]);

        stores.release_gpu_resources(&gl);
        stores.reinit_gpu_resources(&gl, &formats);

        // The reinit upload carries the patched contents.
        let uploads = gl.count_where(
            |c| matches!(c, GlCall::BufferData { target, size: 8, .. } if *target == consts::ARRAY_BUFFER),
        );
        assert_eq!(uploads, 2);
        assert!(stores.vertex_buffer(handle).unwrap().driver_name() != 0);
    }

    #[test]
    fn surface_ids_are_unique_and_nonzero() {
        let mut stores = ResourceStores::new();
        let a = stores.create_surface(SurfaceKind::Placeholder, 64, 64, 0, None);
        let b = stores.create_surface(
            SurfaceKind::DefaultColor { renderbuffer: 0 },
            64,
            64,
            0,
            None,
        );
        let sa = stores.surface(a).unwrap();
        let sb = stores.surface(b).unwrap();
        assert_ne!(sa.unique_id(), sb.unique_id());
        assert_ne!(sa.unique_id(), 0);
        assert!(sa.is_placeholder());
        assert!(sb.is_default_color());
    }
}
