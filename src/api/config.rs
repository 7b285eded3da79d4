//! Pipeline configuration.

use crate::diagnostics::StrictMode;

/// Where backend commands execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendThreading {
    /// On a dedicated worker when the host has more than one hardware thread.
    #[default]
    Auto,
    /// Inline, on the thread that submits each command.
    Off,
    /// On a dedicated worker thread.
    On,
}

impl BackendThreading {
    /// Collapse `Auto` into `On` or `Off` for this host.
    pub fn resolve(self) -> bool {
        match self {
            BackendThreading::On => true,
            BackendThreading::Off => false,
            BackendThreading::Auto => std::thread::available_parallelism()
                .map(|n| n.get() > 1)
                .unwrap_or(false),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "auto" => Some(BackendThreading::Auto),
            "0" | "off" | "false" => Some(BackendThreading::Off),
            "1" | "on" | "true" => Some(BackendThreading::On),
            _ => None,
        }
    }
}

/// Configuration for a [`GpuContext`](crate::GpuContext).
#[derive(Debug, Clone)]
pub struct GpuConfig {
    /// Divide reported counter timestamps by 256 (default: false)
    pub fast_gpu_time: bool,

    /// Backend execution mode (default: Auto)
    pub threading: BackendThreading,

    /// Maximum queued commands before the producer blocks (0 = unbounded)
    pub command_queue_capacity: usize,

    /// Name of the backend worker thread
    pub worker_name: String,

    /// Process-wide strict mode installed when a context is created (None = leave as is)
    pub strict: Option<StrictMode>,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            fast_gpu_time: false,
            threading: BackendThreading::Auto,
            command_queue_capacity: 0,
            worker_name: "gpuquery-backend".to_string(),
            strict: None,
        }
    }
}

impl GpuConfig {
    /// Create a config that executes every command inline.
    pub fn synchronous() -> Self {
        Self {
            threading: BackendThreading::Off,
            ..Self::default()
        }
    }

    /// Create a config with a dedicated backend thread and a bounded queue.
    pub fn threaded() -> Self {
        Self {
            threading: BackendThreading::On,
            command_queue_capacity: 4096,
            ..Self::default()
        }
    }

    /// Read overrides from `GPUQUERY_FAST_GPU_TIME`, `GPUQUERY_THREADING`,
    /// `GPUQUERY_QUEUE_CAPACITY` and `GPUQUERY_STRICT` on top of the defaults.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = var("GPUQUERY_FAST_GPU_TIME") {
            match value.trim().to_lowercase().as_str() {
                "1" | "true" | "on" => self.fast_gpu_time = true,
                "0" | "false" | "off" => self.fast_gpu_time = false,
                _ => log::warn!("ignoring GPUQUERY_FAST_GPU_TIME={value}"),
            }
        }
        if let Some(value) = var("GPUQUERY_THREADING") {
            match BackendThreading::parse(&value) {
                Some(threading) => self.threading = threading,
                None => log::warn!("ignoring GPUQUERY_THREADING={value}"),
            }
        }
        if let Some(value) = var("GPUQUERY_QUEUE_CAPACITY") {
            match value.trim().parse() {
                Ok(capacity) => self.command_queue_capacity = capacity,
                Err(_) => log::warn!("ignoring GPUQUERY_QUEUE_CAPACITY={value}"),
            }
        }
        if let Some(value) = var("GPUQUERY_STRICT") {
            match StrictMode::parse(&value) {
                Some(mode) => self.strict = Some(mode),
                None => log::warn!("ignoring GPUQUERY_STRICT={value}"),
            }
        }
        self
    }

    /// Builder pattern: enable fast GPU time.
    pub fn with_fast_gpu_time(mut self, enable: bool) -> Self {
        self.fast_gpu_time = enable;
        self
    }

    /// Builder pattern: set backend threading.
    pub fn with_threading(mut self, threading: BackendThreading) -> Self {
        self.threading = threading;
        self
    }

    /// Builder pattern: set command queue capacity.
    pub fn with_command_queue_capacity(mut self, capacity: usize) -> Self {
        self.command_queue_capacity = capacity;
        self
    }

    /// Builder pattern: set worker thread name.
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Builder pattern: install a strict mode when the context is created.
    pub fn with_strict_mode(mut self, mode: StrictMode) -> Self {
        self.strict = Some(mode);
        self
    }
}
