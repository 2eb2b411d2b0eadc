//! Data-parallel numeric computation on GPU textures.
//!
//! Host arrays ([`NumericGrid`]) are encoded as float textures, programmable
//! fragment kernels run over them through an offscreen render target, and a
//! ping-pong buffering protocol lets each pass consume the previous pass's
//! output without read/write aliasing. Two pipelines are built on that core:
//! an iterated elementwise linear map ([`run_map`], `y = x + alpha*y`) and a
//! tree reduction that finds the maximum of an NxN grid in log2(N) passes
//! ([`run_reduce`]).
//!
//! All entry points are synchronous and blocking; parallelism happens per
//! texel on the device, never across host threads.

#![forbid(unsafe_code)]

pub mod buffers;
pub mod context;
pub mod engine;
pub mod error;
pub mod format;
pub mod grid;
pub mod kernel;
pub mod map;
pub mod reduce;

pub use buffers::{Buffer, MAX_ATTACHMENTS, RenderTargetSet};
pub use context::GpuContext;
pub use engine::{
    EngineState, PassDescriptor, PassInput, PassRegion, PingPongEngine, PingPongState,
};
pub use error::{TexflowError, TexflowResult};
pub use format::TexelFormat;
pub use grid::NumericGrid;
pub use kernel::{Kernel, KernelBuilder};
pub use map::{reference_map, run_map};
pub use reduce::{ReducePlan, ReduceStep, run_reduce};
