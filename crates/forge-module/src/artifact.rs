//! Loading packaged artifacts: WASM gameplay modules compiled ahead of time
//! and distributed as `.wasm`/`.wat` bytes.
//!
//! The sandbox guarantees mirror those of any embedded WASM host: no WASI,
//! fuel metering so a runaway `tick()` traps rather than hangs a container,
//! and a capped linear memory. The host API surface is deliberately small --
//! a module reads and writes components as flat `f32` values directly
//! against the [`ComponentStore`] it was handed, by raw `(entity_id, cid)`
//! pairs. There is no intermediate command buffer: a write lands in the
//! store before the host call returns, which matches how a native system
//! closure behaves.

use std::sync::Arc;

use forge_ecs::entity::{ComponentId, EntityId};
use forge_ecs::store::ComponentStore;
use wasmtime::{Caller, Config, Engine, Instance, Linker, Module as WasmModule, Store};

use crate::error::ModuleError;

/// Sandbox limits applied to every loaded artifact.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArtifactConfig {
    /// Fuel units granted per `onTick()` call. Exhausting it traps the call
    /// rather than letting it run unbounded.
    pub fuel_per_tick: u64,
    /// Maximum linear memory an artifact may allocate, in WASM pages (64 KiB
    /// each). `None` leaves Wasmtime's default cap in place.
    pub max_memory_pages: Option<u32>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            fuel_per_tick: 2_000_000,
            max_memory_pages: Some(256), // 16 MiB
        }
    }
}

/// State visible to host functions during a single artifact call.
struct HostState {
    store: Arc<ComponentStore>,
    tick: u64,
}

fn read_wasm_string(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> Result<String, String> {
    let memory = caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| "artifact must export 'memory' to use string host calls".to_owned())?;
    let data = memory.data(&caller);
    let start = ptr as usize;
    let end = start.saturating_add(len as usize);
    if end > data.len() {
        return Err(format!("string read out of bounds: ptr={ptr} len={len}"));
    }
    String::from_utf8(data[start..end].to_vec()).map_err(|e| format!("invalid utf8: {e}"))
}

fn register_host_api(linker: &mut Linker<HostState>) -> Result<(), anyhow::Error> {
    linker.func_wrap("forge", "tick_number", |caller: Caller<'_, HostState>| {
        caller.data().tick as i64
    })?;

    linker.func_wrap(
        "forge",
        "get",
        |caller: Caller<'_, HostState>, entity_id: i64, cid: i64| -> f32 {
            caller
                .data()
                .store
                .get(EntityId::new(entity_id as u64), ComponentId::new(cid as u64))
        },
    )?;

    linker.func_wrap(
        "forge",
        "set",
        |caller: Caller<'_, HostState>, entity_id: i64, cid: i64, value: f32| {
            let _ = caller.data().store.attach(
                EntityId::new(entity_id as u64),
                ComponentId::new(cid as u64),
                value,
            );
        },
    )?;

    linker.func_wrap(
        "forge",
        "has",
        |caller: Caller<'_, HostState>, entity_id: i64, cid: i64| -> i32 {
            caller
                .data()
                .store
                .has(EntityId::new(entity_id as u64), ComponentId::new(cid as u64))
                as i32
        },
    )?;

    linker.func_wrap(
        "forge",
        "log",
        |mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32| {
            let msg = match read_wasm_string(&mut caller, ptr, len) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "artifact log(): failed to read message");
                    return;
                }
            };
            match level {
                0 => tracing::trace!(target: "forge_module::artifact", "{msg}"),
                1 => tracing::debug!(target: "forge_module::artifact", "{msg}"),
                2 => tracing::info!(target: "forge_module::artifact", "{msg}"),
                3 => tracing::warn!(target: "forge_module::artifact", "{msg}"),
                _ => tracing::error!(target: "forge_module::artifact", "{msg}"),
            }
        },
    )?;

    Ok(())
}

/// A loaded artifact, instantiated and ready to be driven once per tick.
pub struct LoadedArtifact {
    store: Store<HostState>,
    instance: Instance,
    fuel_per_tick: u64,
}

impl LoadedArtifact {
    /// Compile and instantiate an artifact from raw `.wasm`/`.wat` bytes
    /// against a particular component store.
    pub fn from_bytes(
        config: &ArtifactConfig,
        bytes: &[u8],
        component_store: Arc<ComponentStore>,
    ) -> Result<Self, ModuleError> {
        let mut engine_config = Config::new();
        engine_config.consume_fuel(true);
        let engine = Engine::new(&engine_config)
            .map_err(|e| ModuleError::Internal(anyhow::anyhow!("engine init failed: {e}")))?;

        let wasm_module = WasmModule::new(&engine, bytes)
            .map_err(|e| ModuleError::Conflict { detail: format!("artifact failed to compile: {e}") })?;

        let has_on_tick = wasm_module.exports().any(|e| e.name() == "onTick");
        if !has_on_tick {
            return Err(ModuleError::Conflict {
                detail: "artifact does not export 'onTick'".to_owned(),
            });
        }

        let mut linker = Linker::new(&engine);
        register_host_api(&mut linker)
            .map_err(|e| ModuleError::Internal(anyhow::anyhow!(e)))?;

        let mut store = Store::new(&engine, HostState { store: component_store, tick: 0 });
        store
            .set_fuel(config.fuel_per_tick)
            .map_err(|e| ModuleError::Internal(anyhow::anyhow!("failed to set fuel: {e}")))?;

        let instance = linker
            .instantiate(&mut store, &wasm_module)
            .map_err(|e| ModuleError::Conflict { detail: format!("artifact failed to instantiate: {e}") })?;

        Ok(Self { store, instance, fuel_per_tick: config.fuel_per_tick })
    }

    /// Invoke `onTick()`, resetting the fuel budget first so every call has
    /// an identical allowance regardless of prior consumption.
    pub fn call_on_tick(&mut self, tick: u64) -> Result<(), ModuleError> {
        self.store.data_mut().tick = tick;
        self.store
            .set_fuel(self.fuel_per_tick)
            .map_err(|e| ModuleError::Internal(anyhow::anyhow!("failed to reset fuel: {e}")))?;

        let func = self
            .instance
            .get_typed_func::<(), ()>(&mut self.store, "onTick")
            .map_err(|e| ModuleError::Internal(anyhow::anyhow!("cannot resolve onTick: {e}")))?;

        func.call(&mut self.store, ()).map_err(|trap| {
            ModuleError::Internal(anyhow::anyhow!("onTick trapped: {trap}"))
        })
    }
}
