use crate::error::{TexflowError, TexflowResult};

/// The device/queue bundle every other component borrows.
///
/// Created once, headless, with a high-performance adapter preference.
/// All work is issued from one control thread; parallelism happens per
/// texel on the device, never across host threads.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter: wgpu::Adapter,
    // Keeps the instance alive as long as device-level objects exist.
    _instance: wgpu::Instance,
}

impl GpuContext {
    /// Create a context, blocking on the async adapter and device requests.
    pub fn new_blocking() -> TexflowResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                TexflowError::runtime("no gpu adapter available")
            }
            other => TexflowError::runtime(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
                label: Some("texflow"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            }))
            .map_err(|e| TexflowError::runtime(format!("wgpu request_device failed: {e:?}")))?;

        tracing::debug!(adapter = %adapter.get_info().name, "gpu context ready");

        Ok(Self {
            device,
            queue,
            adapter,
            _instance: instance,
        })
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// The largest supported extent for a 2D buffer, per side.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Explicit synchronization point: blocks until every enqueued pass has
    /// executed. Required before timing measurements; readback performs the
    /// equivalent wait internally.
    pub fn finish(&self) -> TexflowResult<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| TexflowError::runtime(format!("wgpu poll failed: {e:?}")))?;
        Ok(())
    }

    /// Run `f` inside validation and out-of-memory error scopes.
    ///
    /// Out-of-memory always maps to `Allocation`; a validation error is
    /// mapped through `to_err` so call sites can classify it (compile, link,
    /// runtime). wgpu reports device errors asynchronously, so this is the
    /// only place they become `Result`s.
    pub(crate) fn with_error_scope<T>(
        &self,
        context: &str,
        to_err: impl Fn(String) -> TexflowError,
        f: impl FnOnce() -> T,
    ) -> TexflowResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(e) = oom {
            return Err(TexflowError::allocation(format!("{context}: {e}")));
        }
        if let Some(e) = validation {
            return Err(to_err(format!("{context}: {e}")));
        }
        Ok(value)
    }
}
