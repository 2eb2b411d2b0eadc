use crate::{
    buffers::RenderTargetSet,
    context::GpuContext,
    engine::PassInput,
    error::{TexflowError, TexflowResult},
    format::TexelFormat,
};

/// The built-in pass-through vertex stage: a fullscreen triangle clipped by
/// the pass viewport, giving the fragment stage framebuffer pixel
/// coordinates that map 1:1 onto source texels.
pub const DEFAULT_VERTEX_KERNEL: &str = include_str!("kernels/fullscreen.v.wgsl");

/// A compiled, linked kernel with a declared parameter interface.
///
/// The binding contract every fragment source must follow:
/// group 0, binding 0 is a uniform struct holding the declared scalars in
/// declaration order; bindings 1.. are the declared textures in declaration
/// order. The vertex entry point is `vs_main`, the fragment entry point is
/// `fs_main`.
#[derive(Debug)]
pub struct Kernel {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    scalar_names: Vec<String>,
    scalar_values: Vec<f32>,
    texture_names: Vec<String>,
}

impl Kernel {
    pub fn builder(ctx: &GpuContext) -> KernelBuilder<'_> {
        KernelBuilder {
            ctx,
            fragment: None,
            vertex: None,
            scalars: Vec::new(),
            textures: Vec::new(),
            target: TexelFormat::default(),
        }
    }

    /// Set a scalar parameter. An unknown name is tolerated and logged,
    /// matching how a driver treats uniforms that were optimized out of the
    /// kernel.
    pub fn set_scalar(&mut self, name: &str, value: f32) {
        match self.scalar_names.iter().position(|n| n == name) {
            Some(i) => self.scalar_values[i] = value,
            None => tracing::warn!(name, "kernel has no such scalar parameter, ignoring"),
        }
    }

    /// Binding slot of a declared texture parameter, if the kernel knows it.
    pub fn texture_binding(&self, name: &str) -> Option<u32> {
        self.texture_names
            .iter()
            .position(|n| n == name)
            .map(|i| 1 + i as u32)
    }

    /// Upload the current scalar values. Called once per pass, before the
    /// submission that consumes them.
    pub(crate) fn flush_scalars(&self, ctx: &GpuContext) {
        if !self.scalar_values.is_empty() {
            ctx.queue
                .write_buffer(&self.params, 0, bytemuck::cast_slice(&self.scalar_values));
        }
    }

    /// Resolve the pass's read list into a bind group.
    ///
    /// Inputs naming a parameter this kernel never declared are skipped with
    /// a warning (non-fatal); a declared texture parameter left without an
    /// input is a caller error, since the draw could not validate.
    pub(crate) fn bind_inputs(
        &self,
        ctx: &GpuContext,
        targets: &RenderTargetSet,
        reads: &[PassInput],
    ) -> TexflowResult<wgpu::BindGroup> {
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: self.params.as_entire_binding(),
        }];
        let mut resolved = vec![None; self.texture_names.len()];
        for input in reads {
            let Some(binding) = self.texture_binding(&input.param) else {
                tracing::warn!(
                    param = %input.param,
                    "kernel has no such texture parameter, ignoring"
                );
                continue;
            };
            resolved[(binding - 1) as usize] = Some(input.attachment);
        }
        for (i, slot) in resolved.iter().enumerate() {
            let Some(attachment) = slot else {
                return Err(TexflowError::runtime(format!(
                    "texture parameter `{}` was not bound for this pass",
                    self.texture_names[i]
                )));
            };
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + i as u32,
                resource: wgpu::BindingResource::TextureView(
                    targets.buffer(*attachment)?.view(),
                ),
            });
        }
        Ok(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texflow_kernel_bg"),
            layout: &self.bind_group_layout,
            entries: &entries,
        }))
    }

    pub(crate) fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }
}

pub struct KernelBuilder<'a> {
    ctx: &'a GpuContext,
    fragment: Option<String>,
    vertex: Option<String>,
    scalars: Vec<String>,
    textures: Vec<String>,
    target: TexelFormat,
}

impl KernelBuilder<'_> {
    /// Fragment stage WGSL source. Required.
    pub fn fragment(mut self, source: impl Into<String>) -> Self {
        self.fragment = Some(source.into());
        self
    }

    /// Vertex stage WGSL source. Optional; the fullscreen pass-through
    /// applies when absent.
    pub fn vertex(mut self, source: impl Into<String>) -> Self {
        self.vertex = Some(source.into());
        self
    }

    /// Declare a scalar float parameter. Order determines the uniform
    /// struct layout.
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.scalars.push(name.into());
        self
    }

    /// Declare a buffer-reference parameter. Order determines the binding
    /// slot (first texture is binding 1).
    pub fn texture(mut self, name: impl Into<String>) -> Self {
        self.textures.push(name.into());
        self
    }

    /// Format of the render attachment this kernel writes.
    pub fn target_format(mut self, format: TexelFormat) -> Self {
        self.target = format;
        self
    }

    pub fn build(self) -> TexflowResult<Kernel> {
        let ctx = self.ctx;
        let fragment_source = self
            .fragment
            .ok_or_else(|| TexflowError::link("a fragment stage is required"))?;
        let vertex_source = self
            .vertex
            .unwrap_or_else(|| DEFAULT_VERTEX_KERNEL.to_string());

        let vertex_module = compile_stage(ctx, "vertex", &vertex_source)?;
        let fragment_module = compile_stage(ctx, "fragment", &fragment_source)?;

        let mut layout_entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for i in 0..self.textures.len() {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                },
                count: None,
            });
        }
        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("texflow_kernel_bgl"),
                    entries: &layout_entries,
                });
        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("texflow_kernel_pl"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx.with_error_scope("kernel link", TexflowError::Link, || {
            ctx.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("texflow_kernel_pipeline"),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &vertex_module,
                        entry_point: Some("vs_main"),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        buffers: &[],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &fragment_module,
                        entry_point: Some("fs_main"),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: self.target.wgpu_format(),
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
        })?;

        // One 16-byte-aligned uniform allocation covering all scalars;
        // starts zeroed.
        let params_size = ((self.scalars.len().max(1) * 4) as u64).next_multiple_of(16);
        let params = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texflow_kernel_params"),
            size: params_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let scalar_values = vec![0.0; self.scalars.len()];
        Ok(Kernel {
            pipeline,
            bind_group_layout,
            params,
            scalar_names: self.scalars,
            scalar_values,
            texture_names: self.textures,
        })
    }
}

fn compile_stage(
    ctx: &GpuContext,
    stage: &str,
    source: &str,
) -> TexflowResult<wgpu::ShaderModule> {
    ctx.with_error_scope(&format!("{stage} stage"), TexflowError::Compile, || {
        ctx.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("texflow_kernel_stage"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
    })
}
