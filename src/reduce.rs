use crate::{
    buffers::RenderTargetSet,
    context::GpuContext,
    engine::{PassRegion, PingPongEngine, PingPongState},
    error::{TexflowError, TexflowResult},
    format::TexelFormat,
    grid::NumericGrid,
    kernel::Kernel,
};

/// Companion fragment kernel folding the 2x2 neighborhood at stride
/// `delta` down to its maximum.
pub const MAX_REDUCE_KERNEL: &str = include_str!("kernels/max_reduce.f.wgsl");

const SCRATCH_SLOT: usize = 0;
const DATA_SLOT: usize = 1;

/// One round of the reduction tree: the region to draw and the sampling
/// stride, which always equals the output extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReduceStep {
    pub region: PassRegion,
    pub delta: u32,
}

/// The pure pass schedule of a tree reduction over an `extent` x `extent`
/// grid: regions halve every round until 1x1, exactly log2(extent) rounds.
#[derive(Clone, Debug)]
pub struct ReducePlan {
    next_extent: u32,
}

impl ReducePlan {
    pub fn new(extent: u32) -> TexflowResult<Self> {
        if extent < 2 || !extent.is_power_of_two() {
            return Err(TexflowError::attachment(format!(
                "reduce expects a power-of-two extent >= 2, got {extent}"
            )));
        }
        Ok(Self {
            next_extent: extent >> 1,
        })
    }

    /// Number of passes the plan will yield.
    pub fn pass_count(extent: u32) -> u32 {
        extent.trailing_zeros()
    }
}

impl Iterator for ReducePlan {
    type Item = ReduceStep;

    fn next(&mut self) -> Option<ReduceStep> {
        if self.next_extent == 0 {
            return None;
        }
        let out = self.next_extent;
        self.next_extent >>= 1;
        Some(ReduceStep {
            region: PassRegion::square(out),
            delta: out,
        })
    }
}

/// Reduce a square power-of-two single-channel grid to its maximum element
/// on the device.
///
/// The combining operation is associative, commutative and idempotent, so
/// the tree order never affects the result and the device maximum is exact
/// (no rounding is involved in `max`).
#[tracing::instrument(skip(ctx, grid), fields(extent = grid.width()))]
pub fn run_reduce(ctx: &GpuContext, grid: &NumericGrid) -> TexflowResult<f32> {
    if grid.channels() != 1 {
        return Err(TexflowError::attachment(format!(
            "reduce expects a single-channel grid, got {} channels",
            grid.channels()
        )));
    }
    if grid.width() != grid.height() {
        return Err(TexflowError::attachment(format!(
            "reduce expects a square grid, got {}x{}",
            grid.width(),
            grid.height()
        )));
    }
    let extent = grid.width();
    let plan = ReducePlan::new(extent)?;

    // Data lands in the initial read slot; the scratch slot starts zeroed
    // and is fully overwritten before it is ever read.
    let targets = RenderTargetSet::create(
        ctx,
        TexelFormat::R32Float,
        extent,
        extent,
        &[None, Some(grid)],
    )?;

    let mut kernel = Kernel::builder(ctx)
        .fragment(MAX_REDUCE_KERNEL)
        .scalar("delta")
        .texture("texture_src")
        .target_format(TexelFormat::R32Float)
        .build()?;

    let mut engine = PingPongEngine::new(
        PingPongState::new(DATA_SLOT, SCRATCH_SLOT)?,
        "texture_src",
        vec![],
    );
    engine.start()?;

    for step in plan {
        kernel.set_scalar("delta", step.delta as f32);
        let desc = engine.next_descriptor(step.region)?;
        engine.run_pass(ctx, &targets, &kernel, &desc)?;
    }
    debug_assert_eq!(engine.passes_completed(), ReducePlan::pass_count(extent));

    let result = engine.complete()?;
    let out = targets.read_attachment(ctx, result, 1, 1)?;
    Ok(out.get(0, 0, 0))
}
