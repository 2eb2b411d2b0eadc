use crate::{
    buffers::RenderTargetSet,
    context::GpuContext,
    engine::{PassInput, PassRegion, PingPongEngine, PingPongState},
    error::{TexflowError, TexflowResult},
    format::TexelFormat,
    grid::NumericGrid,
    kernel::Kernel,
};

/// Companion fragment kernel computing `out = x + alpha * y` per texel.
pub const LINEAR_MAP_KERNEL: &str = include_str!("kernels/linear_map.f.wgsl");

/// Attachment layout: two ping-pong slots for Y, the constant X at slot 2.
const Y_FRONT: usize = 0;
const Y_BACK: usize = 1;
const X_SLOT: usize = 2;

/// Apply `y = x + alpha * y` elementwise for a fixed number of iterations
/// on the device and return the final Y grid.
///
/// Arithmetic runs in single precision on the GPU; agreement with
/// [`reference_map`] is within an epsilon, not bit-exact. With zero
/// iterations the input `y` comes back unchanged (a pure upload/readback
/// round trip).
#[tracing::instrument(skip(ctx, x, y), fields(width = x.width(), height = x.height()))]
pub fn run_map(
    ctx: &GpuContext,
    x: &NumericGrid,
    y: &NumericGrid,
    alpha: f32,
    iterations: u32,
) -> TexflowResult<NumericGrid> {
    if x.width() != y.width() || x.height() != y.height() || x.channels() != y.channels() {
        return Err(TexflowError::attachment(format!(
            "map operands disagree: x is {}x{}x{}, y is {}x{}x{}",
            x.width(),
            x.height(),
            x.channels(),
            y.width(),
            y.height(),
            y.channels()
        )));
    }
    let format = TexelFormat::for_channels(x.channels()).ok_or_else(|| {
        TexflowError::attachment(format!("no texel format with {} channels", x.channels()))
    })?;
    let width = x.width();
    let height = x.height();

    // Both ping-pong slots start as Y so the first read is valid either way.
    let targets =
        RenderTargetSet::create(ctx, format, width, height, &[Some(y), Some(y), Some(x)])?;

    let mut kernel = Kernel::builder(ctx)
        .fragment(LINEAR_MAP_KERNEL)
        .scalar("alpha")
        .texture("texture_y")
        .texture("texture_x")
        .target_format(format)
        .build()?;
    kernel.set_scalar("alpha", alpha);

    let mut engine = PingPongEngine::new(
        PingPongState::new(Y_BACK, Y_FRONT)?,
        "texture_y",
        vec![PassInput::new("texture_x", X_SLOT)],
    );
    engine.start()?;

    let region = PassRegion { width, height };
    for _ in 0..iterations {
        let desc = engine.next_descriptor(region)?;
        engine.run_pass(ctx, &targets, &kernel, &desc)?;
    }
    let result = engine.complete()?;
    targets.read_attachment(ctx, result, width, height)
}

/// Scalar host reference: `iterations` sequential applications of
/// `y = x + alpha * y`. Used by tests and the CLI's compare mode.
pub fn reference_map(x: &NumericGrid, y: &NumericGrid, alpha: f32, iterations: u32) -> NumericGrid {
    let mut out = y.clone();
    for (out_v, x_v) in out.as_mut_slice().iter_mut().zip(x.as_slice()) {
        for _ in 0..iterations {
            *out_v = x_v + alpha * *out_v;
        }
    }
    out
}
