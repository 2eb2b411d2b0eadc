use crate::{
    context::GpuContext,
    error::{TexflowError, TexflowResult},
    format::TexelFormat,
    grid::NumericGrid,
};

/// Attachment slots available on one render target set.
pub const MAX_ATTACHMENTS: usize = 16;

/// A device-resident rectangular float buffer: one 2D texture plus its
/// default view. Filtering never applies — kernels address texels with
/// integer loads, so device values correspond exactly to grid elements.
#[derive(Debug)]
pub struct Buffer {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: TexelFormat,
}

impl Buffer {
    fn create(
        ctx: &GpuContext,
        format: TexelFormat,
        width: u32,
        height: u32,
        index: usize,
    ) -> TexflowResult<Self> {
        let texture = ctx.with_error_scope(
            "buffer creation",
            TexflowError::Allocation,
            || {
                ctx.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("texflow_buffer"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: format.wgpu_format(),
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC
                        | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            },
        )?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        tracing::debug!(index, width, height, %format, "buffer allocated");
        Ok(Self {
            texture,
            view,
            width,
            height,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

/// Owns 1..=16 equally sized buffers acting as indexed attachment points.
///
/// Buffers are created together, released together (on drop, also on every
/// error path), and never resized. A pass writes to exactly one attachment
/// and reads from any of the others.
#[derive(Debug)]
pub struct RenderTargetSet {
    width: u32,
    height: u32,
    format: TexelFormat,
    buffers: Vec<Buffer>,
}

impl RenderTargetSet {
    /// Allocate `initial.len()` attachments of `width` x `height`.
    ///
    /// A `Some(grid)` entry pre-populates the attachment through a direct
    /// upload; a `None` entry starts zeroed. Any grid whose dimensions or
    /// channel count disagree with the set fails with an attachment error
    /// before device memory is touched.
    pub fn create(
        ctx: &GpuContext,
        format: TexelFormat,
        width: u32,
        height: u32,
        initial: &[Option<&NumericGrid>],
    ) -> TexflowResult<Self> {
        if width == 0 || height == 0 {
            return Err(TexflowError::allocation(format!(
                "render target dimensions must be positive, got {width}x{height}"
            )));
        }
        let max = ctx.max_texture_dimension();
        if width > max || height > max {
            return Err(TexflowError::allocation(format!(
                "render target {width}x{height} exceeds the device limit of {max}"
            )));
        }
        validate_initial(format, width, height, initial)?;

        let mut buffers = Vec::with_capacity(initial.len());
        for (index, entry) in initial.iter().enumerate() {
            let buffer = Buffer::create(ctx, format, width, height, index)?;
            if let Some(grid) = entry {
                upload_grid(ctx, &buffer, grid);
            }
            buffers.push(buffer);
        }

        Ok(Self {
            width,
            height,
            format,
            buffers,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    pub fn attachment_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer(&self, index: usize) -> TexflowResult<&Buffer> {
        self.buffers.get(index).ok_or_else(|| {
            TexflowError::attachment(format!(
                "attachment index {index} out of range (set holds {})",
                self.buffers.len()
            ))
        })
    }

    /// Synchronously transfer the top-left `width` x `height` region of one
    /// attachment back to the host, in the original row-major layout.
    ///
    /// Copies through a staging buffer with device-aligned rows, waits for
    /// every previously enqueued pass, then strips the padding.
    pub fn read_attachment(
        &self,
        ctx: &GpuContext,
        index: usize,
        width: u32,
        height: u32,
    ) -> TexflowResult<NumericGrid> {
        let buffer = self.buffer(index)?;
        if width == 0 || height == 0 || width > self.width || height > self.height {
            return Err(TexflowError::attachment(format!(
                "read region {width}x{height} outside attachment extent {}x{}",
                self.width, self.height
            )));
        }

        let bytes_per_row_unpadded = width * self.format.bytes_per_texel();
        let bytes_per_row = align_to(bytes_per_row_unpadded, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let staging_size = (bytes_per_row as u64) * (height as u64);

        let staging = ctx.with_error_scope(
            "readback staging buffer",
            TexflowError::Allocation,
            || {
                ctx.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("texflow_readback"),
                    size: staging_size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            },
        )?;

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texflow_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &buffer.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        ctx.with_error_scope("readback copy", TexflowError::Runtime, || {
            ctx.queue.submit(Some(encoder.finish()))
        })?;

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        ctx.finish()?;
        rx.recv()
            .map_err(|_| TexflowError::runtime("readback channel closed"))?
            .map_err(|e| TexflowError::runtime(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let floats_per_row = (width * self.format.channels()) as usize;
        let mut out = Vec::with_capacity(floats_per_row * height as usize);
        for row in 0..height as usize {
            let start = row * bytes_per_row as usize;
            let row_bytes = &mapped[start..start + bytes_per_row_unpadded as usize];
            out.extend_from_slice(bytemuck::cast_slice::<u8, f32>(row_bytes));
        }
        drop(mapped);
        staging.unmap();

        NumericGrid::from_vec(width, height, self.format.channels(), out)
    }
}

fn validate_initial(
    format: TexelFormat,
    width: u32,
    height: u32,
    initial: &[Option<&NumericGrid>],
) -> TexflowResult<()> {
    if initial.is_empty() {
        return Err(TexflowError::attachment(
            "a render target set needs at least one attachment",
        ));
    }
    if initial.len() > MAX_ATTACHMENTS {
        return Err(TexflowError::attachment(format!(
            "{} attachments requested, at most {MAX_ATTACHMENTS} supported",
            initial.len()
        )));
    }
    for (index, entry) in initial.iter().enumerate() {
        let Some(grid) = entry else { continue };
        if grid.width() != width || grid.height() != height {
            return Err(TexflowError::attachment(format!(
                "attachment {index} is {}x{}, attached grids must have same dimensions ({width}x{height})",
                grid.width(),
                grid.height()
            )));
        }
        if grid.channels() != format.channels() {
            return Err(TexflowError::attachment(format!(
                "attachment {index} carries {} channels, format {format} expects {}",
                grid.channels(),
                format.channels()
            )));
        }
    }
    Ok(())
}

fn upload_grid(ctx: &GpuContext, buffer: &Buffer, grid: &NumericGrid) {
    ctx.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &buffer.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(grid.as_slice()),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(grid.width() * buffer.format.bytes_per_texel()),
            rows_per_image: Some(grid.height()),
        },
        wgpu::Extent3d {
            width: grid.width(),
            height: grid.height(),
            depth_or_array_layers: 1,
        },
    );
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_copy_rows() {
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(20, 256), 256);
    }

    #[test]
    fn empty_attachment_list_rejected() {
        let err = validate_initial(TexelFormat::R32Float, 4, 4, &[]).unwrap_err();
        assert!(matches!(err, TexflowError::Attachment(_)));
    }

    #[test]
    fn too_many_attachments_rejected() {
        let entries: Vec<Option<&NumericGrid>> = vec![None; MAX_ATTACHMENTS + 1];
        let err = validate_initial(TexelFormat::R32Float, 4, 4, &entries).unwrap_err();
        assert!(matches!(err, TexflowError::Attachment(_)));
    }

    #[test]
    fn mismatched_grid_dimensions_rejected() {
        let small = NumericGrid::zeroed(2, 2, 1).unwrap();
        let err =
            validate_initial(TexelFormat::R32Float, 4, 4, &[None, Some(&small)]).unwrap_err();
        assert!(matches!(err, TexflowError::Attachment(_)));
        assert!(err.to_string().contains("same dimensions"));
    }

    #[test]
    fn mismatched_channel_count_rejected() {
        let rgba = NumericGrid::zeroed(4, 4, 4).unwrap();
        let err = validate_initial(TexelFormat::R32Float, 4, 4, &[Some(&rgba)]).unwrap_err();
        assert!(matches!(err, TexflowError::Attachment(_)));
    }

    #[test]
    fn matching_attachments_accepted() {
        let g = NumericGrid::zeroed(4, 4, 1).unwrap();
        validate_initial(TexelFormat::R32Float, 4, 4, &[Some(&g), Some(&g), None]).unwrap();
    }
}
