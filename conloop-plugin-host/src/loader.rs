//! Plugin loader using wasmtime
//!
//! Checks a compiled module against the plugin contract, instantiates it with
//! the `console` host imports and reads its manifest. Every guest call runs
//! with a fresh fuel budget.

use crate::bridge::WasmCommand;
use anyhow::anyhow;
use conloop::{HostApi, Level};
use conloop_plugin_api::{
    exports, imports, unpack_ptr_len, PluginManifest, API_VERSION, HOST_MODULE,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use thiserror::Error;
use wasmtime::*;

/// Default fuel budget per guest call
pub const DEFAULT_FUEL: u64 = 10_000_000;

/// Errors that can occur during plugin loading and execution
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Engine creation failed: {0}")]
    EngineCreation(#[source] anyhow::Error),

    #[error("Linker setup failed: {0}")]
    Linker(#[source] anyhow::Error),

    #[error("No valid plugin contract: {0}")]
    Contract(#[from] ContractError),

    #[error("Instantiation failed: {0}")]
    Instantiation(String),

    #[error("{function} trapped: {message}")]
    Trap {
        function: &'static str,
        message: String,
    },

    #[error("{0}")]
    Failed(String),

    #[error("Memory access error: {0}")]
    MemoryAccess(String),

    #[error("Fuel exhausted (CPU limit exceeded)")]
    FuelExhausted,
}

/// The module does not implement the plugin contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("missing export '{0}'")]
    MissingExport(&'static str),

    #[error("export '{name}' must be {expected}")]
    WrongSignature {
        name: &'static str,
        expected: &'static str,
    },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("API version mismatch: expected {expected}, got {actual}")]
    ApiVersionMismatch { expected: u32, actual: u32 },
}

/// Store data for one plugin instance
pub struct HostState {
    /// Bound once the manifest has been validated
    api: Option<HostApi>,
    /// The instance this store belongs to; captured by registered commands
    self_ref: Weak<Mutex<PluginInstance>>,
    /// Arguments of the command being invoked
    args: Vec<String>,
    /// Message passed to `fail` during the current call
    failure: Option<String>,
}

impl HostState {
    fn new() -> Self {
        Self {
            api: None,
            self_ref: Weak::new(),
            args: Vec::new(),
            failure: None,
        }
    }

    fn api(&self) -> anyhow::Result<&HostApi> {
        self.api
            .as_ref()
            .ok_or_else(|| anyhow!("host API called before the plugin was initialized"))
    }
}

/// Create the engine shared by the compiler and the loader
pub fn plugin_engine() -> Result<Engine, LoaderError> {
    let mut config = Config::new();
    config.consume_fuel(true);
    config.wasm_memory64(false);
    Engine::new(&config).map_err(LoaderError::EngineCreation)
}

/// Plugin loader with the host import linker
pub struct PluginLoader {
    engine: Engine,
    linker: Linker<HostState>,
    fuel: u64,
}

/// A plugin instance whose manifest has been read
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    pub instance: Arc<Mutex<PluginInstance>>,
}

/// Instantiated plugin module
pub struct PluginInstance {
    store: Store<HostState>,
    init_fn: TypedFunc<(), i32>,
    invoke_fn: TypedFunc<i32, i32>,
    fuel: u64,
    initialized: bool,
}

impl PluginLoader {
    pub fn new(engine: Engine, fuel: u64) -> Result<Self, LoaderError> {
        let linker = host_linker(&engine).map_err(LoaderError::Linker)?;
        Ok(Self {
            engine,
            linker,
            fuel,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn fuel(&self) -> u64 {
        self.fuel
    }

    /// Instantiate a compiled module and read its manifest
    ///
    /// The returned instance has no host API bound yet; host calls from the
    /// guest trap until [`PluginInstance::bind`] is called.
    pub fn load(&self, module: &Module) -> Result<LoadedPlugin, LoaderError> {
        // 1. Contract surface
        check_contract(module)?;

        // 2. Store with fuel limit
        let mut store = Store::new(&self.engine, HostState::new());
        store
            .set_fuel(self.fuel)
            .map_err(LoaderError::EngineCreation)?;

        // 3. Instantiate (runs the start function, if any)
        let instance = self
            .linker
            .instantiate(&mut store, module)
            .map_err(|e| match call_error("start", e) {
                LoaderError::Trap { message, .. } => LoaderError::Instantiation(message),
                other => other,
            })?;

        // 4. Typed entry points; signatures were checked above
        let manifest_fn = instance
            .get_typed_func::<(), i64>(&mut store, exports::MANIFEST)
            .map_err(|_| ContractError::MissingExport(exports::MANIFEST))?;
        let init_fn = instance
            .get_typed_func::<(), i32>(&mut store, exports::INIT)
            .map_err(|_| ContractError::MissingExport(exports::INIT))?;
        let invoke_fn = instance
            .get_typed_func::<i32, i32>(&mut store, exports::INVOKE)
            .map_err(|_| ContractError::MissingExport(exports::INVOKE))?;
        let memory = instance
            .get_memory(&mut store, exports::MEMORY)
            .ok_or(ContractError::MissingExport(exports::MEMORY))?;

        // 5. Manifest
        store
            .set_fuel(self.fuel)
            .map_err(LoaderError::EngineCreation)?;
        let packed = manifest_fn
            .call(&mut store, ())
            .map_err(|e| call_error(exports::MANIFEST, e))?;
        let (ptr, len) = unpack_ptr_len(packed);
        let bytes = read_bytes(memory.data(&store), ptr, len).map_err(LoaderError::MemoryAccess)?;
        let manifest = PluginManifest::from_slice(&bytes)
            .map_err(|e| ContractError::InvalidManifest(e.to_string()))?;

        // 6. API version
        if manifest.api_version != API_VERSION {
            return Err(ContractError::ApiVersionMismatch {
                expected: API_VERSION,
                actual: manifest.api_version,
            }
            .into());
        }

        let instance = Arc::new(Mutex::new(PluginInstance {
            store,
            init_fn,
            invoke_fn,
            fuel: self.fuel,
            initialized: false,
        }));
        instance.lock().store.data_mut().self_ref = Arc::downgrade(&instance);

        tracing::debug!(plugin = %manifest.name, version = %manifest.version, "Plugin instantiated");
        Ok(LoadedPlugin { manifest, instance })
    }
}

impl PluginInstance {
    /// Give the guest access to the console through `api`
    pub fn bind(&mut self, api: HostApi) {
        self.store.data_mut().api = Some(api);
    }

    /// Call `plugin_init`
    pub fn init(&mut self) -> Result<(), LoaderError> {
        self.begin_call(Vec::new())?;
        let result = self.init_fn.call(&mut self.store, ());
        self.finish_call(exports::INIT, result)?;
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Call `plugin_invoke` for a registered command
    ///
    /// Refused until `plugin_init` has succeeded, so handlers registered by
    /// an init that later failed never run.
    pub fn invoke(&mut self, handler_id: i32, args: &[String]) -> Result<(), LoaderError> {
        if !self.initialized {
            return Err(LoaderError::Failed("plugin is not initialized".into()));
        }
        self.begin_call(args.to_vec())?;
        let result = self.invoke_fn.call(&mut self.store, handler_id);
        self.finish_call(exports::INVOKE, result)
    }

    fn begin_call(&mut self, args: Vec<String>) -> Result<(), LoaderError> {
        let state = self.store.data_mut();
        state.args = args;
        state.failure = None;
        self.store
            .set_fuel(self.fuel)
            .map_err(LoaderError::EngineCreation)
    }

    fn finish_call(
        &mut self,
        function: &'static str,
        result: anyhow::Result<i32>,
    ) -> Result<(), LoaderError> {
        let state = self.store.data_mut();
        state.args.clear();
        let failure = state.failure.take();

        match (result, failure) {
            (Err(e), _) => Err(call_error(function, e)),
            (Ok(_), Some(message)) => Err(LoaderError::Failed(message)),
            (Ok(0), None) => Ok(()),
            (Ok(status), None) => Err(LoaderError::Failed(format!(
                "{} returned status {}",
                function, status
            ))),
        }
    }
}

fn call_error(function: &'static str, err: anyhow::Error) -> LoaderError {
    if matches!(err.downcast_ref::<Trap>(), Some(Trap::OutOfFuel)) {
        return LoaderError::FuelExhausted;
    }
    LoaderError::Trap {
        function,
        message: err.root_cause().to_string(),
    }
}

/// Verify the exports the host relies on, without instantiating
fn check_contract(module: &Module) -> Result<(), ContractError> {
    let export = |name: &'static str| {
        module
            .get_export(name)
            .ok_or(ContractError::MissingExport(name))
    };

    if !matches!(export(exports::MEMORY)?, ExternType::Memory(_)) {
        return Err(ContractError::WrongSignature {
            name: exports::MEMORY,
            expected: "a memory",
        });
    }

    let contract: [(&'static str, &[ValType], &[ValType], &'static str); 3] = [
        (exports::MANIFEST, &[], &[ValType::I64], "a function () -> i64"),
        (exports::INIT, &[], &[ValType::I32], "a function () -> i32"),
        (exports::INVOKE, &[ValType::I32], &[ValType::I32], "a function (i32) -> i32"),
    ];

    for (name, params, results, expected) in contract {
        let matches = match export(name)? {
            ExternType::Func(ty) => {
                same_types(ty.params(), params) && same_types(ty.results(), results)
            }
            _ => false,
        };
        if !matches {
            return Err(ContractError::WrongSignature { name, expected });
        }
    }

    Ok(())
}

fn same_types(actual: impl ExactSizeIterator<Item = ValType>, expected: &[ValType]) -> bool {
    actual.len() == expected.len()
        && actual.zip(expected).all(|(a, e)| {
            matches!(
                (a, e),
                (ValType::I32, ValType::I32) | (ValType::I64, ValType::I64)
            )
        })
}

fn read_bytes(data: &[u8], ptr: i32, len: i32) -> Result<Vec<u8>, String> {
    let (Ok(start), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        return Err(format!("Negative pointer or length: ptr={}, len={}", ptr, len));
    };
    match start.checked_add(len) {
        Some(end) if end <= data.len() => Ok(data[start..end].to_vec()),
        _ => Err(format!(
            "Out of bounds: ptr={}, len={}, memory_size={}",
            start,
            len,
            data.len()
        )),
    }
}

fn guest_memory(caller: &mut Caller<'_, HostState>) -> anyhow::Result<Memory> {
    caller
        .get_export(exports::MEMORY)
        .and_then(Extern::into_memory)
        .ok_or_else(|| anyhow!("plugin does not export '{}'", exports::MEMORY))
}

fn read_string(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> anyhow::Result<String> {
    let memory = guest_memory(caller)?;
    let bytes = read_bytes(memory.data(&*caller), ptr, len).map_err(anyhow::Error::msg)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Linker with every `console` import
fn host_linker(engine: &Engine) -> anyhow::Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);

    linker.func_wrap(
        HOST_MODULE,
        imports::REGISTER_COMMAND,
        |mut caller: Caller<'_, HostState>,
         name_ptr: i32,
         name_len: i32,
         desc_ptr: i32,
         desc_len: i32,
         handler_id: i32|
         -> anyhow::Result<()> {
            let name = read_string(&mut caller, name_ptr, name_len)?;
            let description = if desc_len == 0 {
                None
            } else {
                Some(read_string(&mut caller, desc_ptr, desc_len)?)
            };

            let state = caller.data();
            let api = state.api()?;
            let command = WasmCommand::new(
                state.self_ref.clone(),
                handler_id,
                api.owner().name().to_string(),
            );
            if let Err(e) = api.register_handler(&name, Arc::new(command), description.as_deref()) {
                api.log(&format!("Error: {}", e), Level::Error);
            }
            Ok(())
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        imports::LOG,
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32, level: i32| -> anyhow::Result<()> {
            let message = read_string(&mut caller, ptr, len)?;
            caller.data().api()?.log(&message, Level::from_code(level));
            Ok(())
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        imports::CLEAR_CONSOLE,
        |caller: Caller<'_, HostState>| -> anyhow::Result<()> {
            caller.data().api()?.clear_console();
            Ok(())
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        imports::ARG_COUNT,
        |caller: Caller<'_, HostState>| -> i32 { caller.data().args.len() as i32 },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        imports::ARG_LEN,
        |caller: Caller<'_, HostState>, index: i32| -> i32 {
            usize::try_from(index)
                .ok()
                .and_then(|i| caller.data().args.get(i))
                .map_or(-1, |arg| arg.len() as i32)
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        imports::ARG_READ,
        |mut caller: Caller<'_, HostState>, index: i32, dst: i32, cap: i32| -> anyhow::Result<i32> {
            let Some(arg) = usize::try_from(index)
                .ok()
                .and_then(|i| caller.data().args.get(i))
                .cloned()
            else {
                return Ok(-1);
            };
            let count = arg.len().min(usize::try_from(cap).unwrap_or(0));
            let offset = usize::try_from(dst).map_err(|_| anyhow!("negative destination {}", dst))?;
            let memory = guest_memory(&mut caller)?;
            memory.write(&mut caller, offset, &arg.as_bytes()[..count])?;
            Ok(count as i32)
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        imports::FAIL,
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> anyhow::Result<()> {
            let message = read_string(&mut caller, ptr, len)?;
            caller.data_mut().failure = Some(message);
            Ok(())
        },
    )?;

    Ok(linker)
}
