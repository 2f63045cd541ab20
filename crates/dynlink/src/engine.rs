//! Engine lifecycle: worker threads, attach, shutdown, process-wide
//! instance.

use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use dynlink_core::sync::lock;
use dynlink_core::{
    DataType, Direction, EngineConfig, LinkError, LinkOptions, RemoteAccess, Result, WakeSignal,
};
use dynlink_executor::{attach, input_loop, output_loop, LinkCallback, LinkHandle, LinkSpec, Shared};

struct Workers {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// The link engine: two command queues, two worker threads, one
/// `RemoteAccess` service.
///
/// Workers start on the first attach (or an explicit `start()`) and run
/// until `shutdown()`. Dropping the engine shuts it down.
pub struct Engine {
    shared: Arc<Shared>,
    workers: OnceLock<std::result::Result<Workers, String>>,
}

impl Engine {
    /// Engine using the platform's default wake signal.
    pub fn new(service: Arc<dyn RemoteAccess>, config: EngineConfig) -> Self {
        Self::with_wake(service, dynlink_module::default_wake(), config)
    }

    pub fn with_wake(
        service: Arc<dyn RemoteAccess>,
        wake: Box<dyn WakeSignal>,
        config: EngineConfig,
    ) -> Self {
        Self {
            shared: Shared::new(service, wake, config),
            workers: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.shared.config()
    }

    /// Spawn the worker threads. Runs once; later calls report the
    /// outcome of the first.
    pub fn start(&self) -> Result<()> {
        if self.shared.is_shutting_down() {
            return Err(LinkError::ShuttingDown);
        }
        match self.workers.get_or_init(|| spawn_workers(&self.shared)) {
            Ok(_) => Ok(()),
            Err(msg) => Err(LinkError::Fatal(msg.clone())),
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self.workers.get(), Some(Ok(_)))
    }

    /// Stop both workers and settle whatever is still queued.
    ///
    /// Queued clears are torn down; queued acknowledged requests get
    /// their callback with `FATAL_ERROR`. Later attaches fail with
    /// `ShuttingDown`.
    pub fn shutdown(&self) {
        self.shared.begin_shutdown();
        if let Some(Ok(workers)) = self.workers.get() {
            // Held across the join so a concurrent shutdown settles the
            // queues only after both workers are gone.
            let mut handles = lock(&workers.handles);
            let joined = !handles.is_empty();
            for handle in handles.drain(..) {
                if handle.join().is_err() {
                    error!("worker thread panicked");
                }
            }
            if joined {
                info!("engine stopped");
            }
        }
        self.shared.drain_after_shutdown();
    }

    /// While false, workers leave their queues alone and only pump
    /// protocol events.
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.set_accepting(accepting);
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.is_accepting()
    }

    /// Private states parked because their Clear could not be queued.
    pub fn deferred_clears(&self) -> usize {
        self.shared.deferred_count()
    }

    /// Attach `handle` to the remote point `name` for reading.
    ///
    /// `search_cb` runs on every connection change; `monitor_cb` on every
    /// value update. The first update always follows the first
    /// `search_cb`. An attached handle is cleared first.
    pub fn add_input(
        &self,
        handle: &LinkHandle,
        name: &str,
        data_type: DataType,
        options: LinkOptions,
        search_cb: Option<LinkCallback>,
        monitor_cb: Option<LinkCallback>,
    ) -> Result<()> {
        self.add(
            handle,
            LinkSpec {
                name: name.to_string(),
                direction: Direction::Input,
                data_type,
                options,
                search_cb,
                monitor_cb,
            },
        )
    }

    /// Attach `handle` to the remote point `name` for writing. Outputs
    /// are not subscribed.
    pub fn add_output(
        &self,
        handle: &LinkHandle,
        name: &str,
        data_type: DataType,
        options: LinkOptions,
        search_cb: Option<LinkCallback>,
    ) -> Result<()> {
        self.add(
            handle,
            LinkSpec {
                name: name.to_string(),
                direction: Direction::Output,
                data_type,
                options,
                search_cb,
                monitor_cb: None,
            },
        )
    }

    fn add(&self, handle: &LinkHandle, spec: LinkSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(LinkError::EmptyName);
        }
        self.start()?;
        attach(&self.shared, handle, spec)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_workers(shared: &Arc<Shared>) -> std::result::Result<Workers, String> {
    let loops: [(&str, fn(&Shared)); 2] =
        [("dynlink-input", input_loop), ("dynlink-output", output_loop)];
    let mut handles = Vec::with_capacity(loops.len());
    for (name, body) in loops {
        let worker_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(&worker_shared));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                error!("failed to spawn {}: {}", name, e);
                shared.begin_shutdown();
                for handle in handles {
                    let _ = handle.join();
                }
                return Err(format!("failed to spawn {}: {}", name, e));
            }
        }
    }
    info!(queue_depth = shared.config().queue_depth, "engine started");
    Ok(Workers { handles: Mutex::new(handles) })
}

// ============================================================================
// Process-wide engine
// ============================================================================

static GLOBAL: OnceLock<Engine> = OnceLock::new();

/// Install the process-wide engine. Fails, handing the engine back, if
/// one is already installed.
pub fn install(engine: Engine) -> std::result::Result<(), Engine> {
    GLOBAL.set(engine)
}

/// The process-wide engine, if installed.
pub fn global() -> Option<&'static Engine> {
    GLOBAL.get()
}
