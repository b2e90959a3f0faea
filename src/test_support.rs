use std::ffi::OsString;
use tokio::sync::Mutex as AsyncMutex;

/// Serializes tests that touch `VEXRUN_*` environment variables.
/// Sync tests take it with `.blocking_lock()`, async ones with `.lock().await`.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Sets one variable for the lifetime of the guard, then puts the previous
/// value back. Hold `ENV_LOCK` while it is alive.
pub struct ScopedEnv {
    name: &'static str,
    previous: Option<OsString>,
}

impl ScopedEnv {
    pub fn set(name: &'static str, value: &str) -> Self {
        let previous = std::env::var_os(name);
        std::env::set_var(name, value);
        Self { name, previous }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => std::env::set_var(self.name, value),
            None => std::env::remove_var(self.name),
        }
    }
}
