use crate::{
    buffers::RenderTargetSet,
    context::GpuContext,
    error::{TexflowError, TexflowResult},
    kernel::Kernel,
};

/// The read/write roles over a two-slot buffer pair.
///
/// Invariant: the roles differ at every pass boundary. `swap` exchanges
/// them after each pass so the freshly written buffer becomes the next
/// pass's read source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingPongState {
    read: usize,
    write: usize,
}

impl PingPongState {
    pub fn new(read: usize, write: usize) -> TexflowResult<Self> {
        if read == write {
            return Err(TexflowError::runtime(format!(
                "ping-pong read and write roles must differ, both are {read}"
            )));
        }
        Ok(Self { read, write })
    }

    pub fn read(&self) -> usize {
        self.read
    }

    pub fn write(&self) -> usize {
        self.write
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }
}

/// The active rectangle of a pass, anchored at the origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassRegion {
    pub width: u32,
    pub height: u32,
}

impl PassRegion {
    pub fn square(extent: u32) -> Self {
        Self {
            width: extent,
            height: extent,
        }
    }

    pub fn texels(&self) -> u64 {
        (self.width as u64) * (self.height as u64)
    }
}

/// One read binding of a pass: which attachment feeds which kernel
/// parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassInput {
    pub param: String,
    pub attachment: usize,
}

impl PassInput {
    pub fn new(param: impl Into<String>, attachment: usize) -> Self {
        Self {
            param: param.into(),
            attachment,
        }
    }
}

/// Everything one pass consumes, as a single value: the write attachment,
/// the read bindings, and the active region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassDescriptor {
    pub write: usize,
    pub reads: Vec<PassInput>,
    pub region: PassRegion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Iterating,
    Done,
}

/// Drives iterative passes over a [`RenderTargetSet`]: each pass draws the
/// active region into the current write attachment while the kernel reads
/// the previous pass's output, then the roles swap.
///
/// The descriptor construction and role bookkeeping are pure so the pass
/// schedule can be exercised without a device; only [`Self::run_pass`]
/// touches the GPU.
pub struct PingPongEngine {
    state: EngineState,
    roles: PingPongState,
    ping_param: String,
    fixed_inputs: Vec<PassInput>,
    passes: u32,
}

impl PingPongEngine {
    /// `ping_param` is the kernel texture parameter fed by the ping-pong
    /// read buffer; `fixed_inputs` are constant read-only bindings (such as
    /// the X operand of the map pipeline) that never change roles.
    pub fn new(roles: PingPongState, ping_param: impl Into<String>, fixed_inputs: Vec<PassInput>) -> Self {
        Self {
            state: EngineState::Idle,
            roles,
            ping_param: ping_param.into(),
            fixed_inputs,
            passes: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn roles(&self) -> PingPongState {
        self.roles
    }

    pub fn passes_completed(&self) -> u32 {
        self.passes
    }

    pub fn start(&mut self) -> TexflowResult<()> {
        if self.state != EngineState::Idle {
            return Err(TexflowError::runtime("engine already started"));
        }
        self.state = EngineState::Iterating;
        Ok(())
    }

    /// Build the descriptor for the next pass (pure).
    pub fn next_descriptor(&self, region: PassRegion) -> TexflowResult<PassDescriptor> {
        self.ensure_iterating()?;
        let mut reads = Vec::with_capacity(1 + self.fixed_inputs.len());
        reads.push(PassInput::new(self.ping_param.clone(), self.roles.read));
        reads.extend(self.fixed_inputs.iter().cloned());
        Ok(PassDescriptor {
            write: self.roles.write,
            reads,
            region,
        })
    }

    /// Swap roles and count the pass (pure half of `run_pass`).
    pub fn advance(&mut self) -> TexflowResult<()> {
        self.ensure_iterating()?;
        self.roles.swap();
        self.passes += 1;
        Ok(())
    }

    /// Execute one pass: draw `desc.region` into the write attachment with
    /// the read bindings in place, then advance the roles.
    ///
    /// Any device error surfaces as a fatal `Runtime` error; the run cannot
    /// be resumed, but owned resources are still released by drop.
    pub fn run_pass(
        &mut self,
        ctx: &GpuContext,
        targets: &RenderTargetSet,
        kernel: &Kernel,
        desc: &PassDescriptor,
    ) -> TexflowResult<()> {
        self.ensure_iterating()?;
        for input in &desc.reads {
            if input.attachment == desc.write {
                return Err(TexflowError::runtime(format!(
                    "pass would read and write attachment {} at once",
                    desc.write
                )));
            }
        }
        if desc.region.width == 0
            || desc.region.height == 0
            || desc.region.width > targets.width()
            || desc.region.height > targets.height()
        {
            return Err(TexflowError::attachment(format!(
                "active region {}x{} outside target extent {}x{}",
                desc.region.width,
                desc.region.height,
                targets.width(),
                targets.height()
            )));
        }

        kernel.flush_scalars(ctx);
        let bind_group = kernel.bind_inputs(ctx, targets, &desc.reads)?;
        let write_view = targets.buffer(desc.write)?.view();

        ctx.with_error_scope("pass execution", TexflowError::Runtime, || {
            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("texflow_pass_encoder"),
                });
            {
                let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("texflow_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: write_view,
                        resolve_target: None,
                        depth_slice: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                rp.set_pipeline(kernel.pipeline());
                rp.set_bind_group(0, &bind_group, &[]);
                rp.set_viewport(
                    0.0,
                    0.0,
                    desc.region.width as f32,
                    desc.region.height as f32,
                    0.0,
                    1.0,
                );
                rp.set_scissor_rect(0, 0, desc.region.width, desc.region.height);
                rp.draw(0..3, 0..1);
            }
            ctx.queue.submit(Some(encoder.finish()));
        })?;

        tracing::debug!(
            pass = self.passes,
            write = desc.write,
            width = desc.region.width,
            height = desc.region.height,
            "pass submitted"
        );
        self.advance()
    }

    /// Terminate the run. Returns the attachment holding the final result
    /// (the last one written).
    pub fn complete(&mut self) -> TexflowResult<usize> {
        self.ensure_iterating()?;
        self.state = EngineState::Done;
        Ok(self.result_attachment())
    }

    /// The attachment written by the most recent pass: after the final
    /// swap this is the read slot. With zero passes it is the initial read
    /// slot, so a zero-pass run reads back exactly what was uploaded.
    pub fn result_attachment(&self) -> usize {
        self.roles.read
    }

    fn ensure_iterating(&self) -> TexflowResult<()> {
        match self.state {
            EngineState::Iterating => Ok(()),
            EngineState::Idle => Err(TexflowError::runtime("engine was not started")),
            EngineState::Done => Err(TexflowError::runtime(
                "no further passes are valid once the engine is done",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_roles_rejected() {
        let err = PingPongState::new(1, 1).unwrap_err();
        assert!(matches!(err, TexflowError::Runtime(_)));
    }

    #[test]
    fn roles_never_alias_across_swaps() {
        let mut roles = PingPongState::new(1, 0).unwrap();
        for _ in 0..17 {
            assert_ne!(roles.read(), roles.write());
            roles.swap();
        }
    }

    #[test]
    fn descriptor_reads_opposite_of_write() {
        let mut engine = PingPongEngine::new(
            PingPongState::new(1, 0).unwrap(),
            "texture_y",
            vec![PassInput::new("texture_x", 2)],
        );
        engine.start().unwrap();
        for pass in 0..6 {
            let desc = engine.next_descriptor(PassRegion::square(8)).unwrap();
            assert_ne!(desc.write, desc.reads[0].attachment, "pass {pass}");
            assert_eq!(desc.reads[0].param, "texture_y");
            assert_eq!(desc.reads[1], PassInput::new("texture_x", 2));
            engine.advance().unwrap();
        }
        assert_eq!(engine.passes_completed(), 6);
    }

    #[test]
    fn result_attachment_tracks_last_write() {
        let mut engine = PingPongEngine::new(PingPongState::new(1, 0).unwrap(), "src", vec![]);
        engine.start().unwrap();
        // Zero passes: result is the initially uploaded read slot.
        assert_eq!(engine.result_attachment(), 1);
        engine.advance().unwrap(); // wrote 0
        assert_eq!(engine.result_attachment(), 0);
        engine.advance().unwrap(); // wrote 1
        assert_eq!(engine.result_attachment(), 1);
    }

    #[test]
    fn lifecycle_is_idle_iterating_done() {
        let mut engine = PingPongEngine::new(PingPongState::new(0, 1).unwrap(), "src", vec![]);
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.next_descriptor(PassRegion::square(4)).is_err());
        assert!(engine.advance().is_err());

        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Iterating);
        assert!(engine.start().is_err());
        engine.advance().unwrap();

        let result = engine.complete().unwrap();
        assert_eq!(result, engine.result_attachment());
        assert_eq!(engine.state(), EngineState::Done);
        assert!(engine.advance().is_err());
        assert!(engine.next_descriptor(PassRegion::square(4)).is_err());
        assert!(engine.complete().is_err());
    }
}
