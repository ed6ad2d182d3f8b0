//! The per-match tick pipeline and the scheduler driving it, either one
//! step at a time or on an automatic interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use forge_ecs::store::ComponentStore;
use forge_module::logic_unit::LogicUnitManager;
use forge_module::module::CommandInvocation;
use forge_module::module_runtime::ModuleRuntime;

use crate::command::{CommandQueue, CommandResolver};
use crate::error::EngineError;

/// Timing and outcome counters for the most recently completed tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time spent applying the drained command queue.
    pub command_apply_time: Duration,
    /// Wall-clock time per module, in registration order.
    pub system_times: Vec<(String, Duration)>,
    /// Wall-clock time per logic unit, in registration order.
    pub logic_unit_times: Vec<(String, Duration)>,
    /// Total wall-clock time for the tick.
    pub total_time: Duration,
    pub commands_processed_total: u64,
    pub commands_failed_total: u64,
}

/// One tick's worth of work for a single match: drain commands and
/// dispatch each to the module that registered it, run every enabled
/// module's systems in registration order (a failure is logged and
/// skipped rather than aborting the tick), invoke every enabled logic
/// unit's `onTick` in its own isolated phase, then advance the counter.
pub struct GameLoop {
    match_name: String,
    component_store: Arc<ComponentStore>,
    enabled_modules: Vec<String>,
    module_runtime: Arc<ModuleRuntime>,
    enabled_logic_units: Vec<String>,
    logic_units: Arc<LogicUnitManager>,
    command_queue: Arc<CommandQueue>,
    resolver: Arc<CommandResolver>,
    tick_count: AtomicU64,
    on_tick_complete: Option<Arc<dyn Fn(u64) + Send + Sync>>,
    diagnostics: Mutex<TickDiagnostics>,
    commands_processed_total: AtomicU64,
    commands_failed_total: AtomicU64,
}

impl GameLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        match_name: impl Into<String>,
        component_store: Arc<ComponentStore>,
        enabled_modules: Vec<String>,
        module_runtime: Arc<ModuleRuntime>,
        enabled_logic_units: Vec<String>,
        logic_units: Arc<LogicUnitManager>,
        command_queue: Arc<CommandQueue>,
        resolver: Arc<CommandResolver>,
    ) -> Self {
        Self {
            match_name: match_name.into(),
            component_store,
            enabled_modules,
            module_runtime,
            enabled_logic_units,
            logic_units,
            command_queue,
            resolver,
            tick_count: AtomicU64::new(0),
            on_tick_complete: None,
            diagnostics: Mutex::new(TickDiagnostics::default()),
            commands_processed_total: AtomicU64::new(0),
            commands_failed_total: AtomicU64::new(0),
        }
    }

    /// Install a hook run after every tick completes, given the new tick
    /// number. Used by the container to drive snapshot auto-sampling
    /// without this module depending on the snapshot machinery.
    pub fn with_on_tick_complete(mut self, hook: Arc<dyn Fn(u64) + Send + Sync>) -> Self {
        self.on_tick_complete = Some(hook);
        self
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    pub fn run_tick(&self) -> Result<(), EngineError> {
        let tick_start = Instant::now();

        let apply_start = Instant::now();
        let drained = self.command_queue.drain();
        for command in &drained {
            let Some(module_name) = self.resolver.owner_of(&command.name).map(str::to_owned) else {
                continue;
            };
            let invocation = CommandInvocation { producer_id: command.producer_id.clone(), payload: command.payload.clone() };
            self.commands_processed_total.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = self.module_runtime.dispatch_command(
                &self.match_name,
                &module_name,
                &command.name,
                &self.component_store,
                &invocation,
            ) {
                self.commands_failed_total.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    match_name = self.match_name.as_str(),
                    module_name = module_name.as_str(),
                    command = command.name.as_str(),
                    error = %e,
                    "command handler failed"
                );
            }
        }
        let command_apply_time = apply_start.elapsed();

        let mut system_times = Vec::with_capacity(self.enabled_modules.len());
        for module_name in &self.enabled_modules {
            let system_start = Instant::now();
            if let Err(e) = self.module_runtime.on_tick(&self.match_name, module_name, &self.component_store) {
                tracing::warn!(
                    match_name = self.match_name.as_str(),
                    module_name = module_name.as_str(),
                    error = %e,
                    "module system failed this tick"
                );
            }
            system_times.push((module_name.clone(), system_start.elapsed()));
        }

        let mut logic_unit_times = Vec::with_capacity(self.enabled_logic_units.len());
        for unit_name in &self.enabled_logic_units {
            let unit_start = Instant::now();
            if let Err(e) = self.logic_units.on_tick(&self.match_name, unit_name, &self.component_store) {
                tracing::warn!(
                    match_name = self.match_name.as_str(),
                    unit_name = unit_name.as_str(),
                    error = %e,
                    "logic unit failed this tick"
                );
            }
            logic_unit_times.push((unit_name.clone(), unit_start.elapsed()));
        }

        *self.diagnostics.lock().expect("tick diagnostics lock poisoned") = TickDiagnostics {
            command_apply_time,
            system_times,
            logic_unit_times,
            total_time: tick_start.elapsed(),
            commands_processed_total: self.commands_processed_total.load(Ordering::SeqCst),
            commands_failed_total: self.commands_failed_total.load(Ordering::SeqCst),
        };

        let tick = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.on_tick_complete {
            hook(tick);
        }
        Ok(())
    }

    /// Timing and outcome counters from the most recently completed tick.
    /// Default (all-zero) before the first tick runs.
    pub fn diagnostics(&self) -> TickDiagnostics {
        self.diagnostics.lock().expect("tick diagnostics lock poisoned").clone()
    }
}

struct AutoState {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Drives a [`GameLoop`] either one step at a time via [`advance`](Self::advance),
/// or continuously on a background thread via [`start_auto`](Self::start_auto).
/// The two modes are mutually exclusive: manual advances are rejected while
/// auto-advance is running.
pub struct TickScheduler {
    game_loop: Arc<GameLoop>,
    auto: Mutex<Option<AutoState>>,
}

impl TickScheduler {
    pub fn new(game_loop: Arc<GameLoop>) -> Self {
        Self { game_loop, auto: Mutex::new(None) }
    }

    pub fn current_tick(&self) -> u64 {
        self.game_loop.tick_count()
    }

    pub fn diagnostics(&self) -> TickDiagnostics {
        self.game_loop.diagnostics()
    }

    pub fn is_auto(&self) -> bool {
        self.auto.lock().expect("tick scheduler lock poisoned").is_some()
    }

    /// Run exactly one tick. Rejected with `InvalidState` while
    /// auto-advance is active.
    pub fn advance(&self) -> Result<u64, EngineError> {
        if self.is_auto() {
            return Err(EngineError::InvalidState {
                detail: "cannot manually advance while auto-advance is running".to_owned(),
            });
        }
        self.game_loop.run_tick()?;
        Ok(self.game_loop.tick_count())
    }

    /// Start a background thread calling [`GameLoop::run_tick`] every
    /// `interval`. Rejected if auto-advance is already running.
    pub fn start_auto(&self, interval: Duration) -> Result<(), EngineError> {
        let mut auto = self.auto.lock().expect("tick scheduler lock poisoned");
        if auto.is_some() {
            return Err(EngineError::InvalidState { detail: "auto-advance is already running".to_owned() });
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = stop.clone();
        let game_loop = self.game_loop.clone();
        let join = std::thread::spawn(move || {
            while !stop_for_thread.load(Ordering::SeqCst) {
                if let Err(e) = game_loop.run_tick() {
                    tracing::error!(error = %e, "auto-advance tick failed");
                }
                std::thread::sleep(interval);
            }
        });

        *auto = Some(AutoState { stop, join });
        Ok(())
    }

    /// Stop the auto-advance thread, blocking until it exits. A no-op if
    /// auto-advance isn't running.
    pub fn stop_auto(&self) -> Result<(), EngineError> {
        let state = self.auto.lock().expect("tick scheduler lock poisoned").take();
        if let Some(state) = state {
            state.stop.store(true, Ordering::SeqCst);
            state.join.join().map_err(|_| EngineError::Internal(anyhow::anyhow!("auto-advance thread panicked")))?;
        }
        Ok(())
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        let _ = self.stop_auto();
    }
}
