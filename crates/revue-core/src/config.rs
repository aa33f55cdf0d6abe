//! Runtime-wide knobs, one set per thread.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use web_time::Instant;

use crate::error::{Error, panic_message};

pub type ErrorHandler = Rc<dyn Fn(&Error)>;
pub type WarnHandler = Rc<dyn Fn(&str)>;

#[derive(Clone)]
pub struct RuntimeConfig {
    /// Suppress warnings (errors are still reported).
    pub silent: bool,
    /// Log render/patch durations at debug level.
    pub performance: bool,
    /// When false, queued watchers flush synchronously instead of on the next tick.
    pub async_updates: bool,
    pub error_handler: Option<ErrorHandler>,
    pub warn_handler: Option<WarnHandler>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            silent: false,
            performance: false,
            async_updates: true,
            error_handler: None,
            warn_handler: None,
        }
    }
}

impl RuntimeConfig {
    pub fn error_handler(mut self, f: impl Fn(&Error) + 'static) -> Self {
        self.error_handler = Some(Rc::new(f));
        self
    }
    pub fn warn_handler(mut self, f: impl Fn(&str) + 'static) -> Self {
        self.warn_handler = Some(Rc::new(f));
        self
    }
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
    pub fn performance(mut self, on: bool) -> Self {
        self.performance = on;
        self
    }
    pub fn async_updates(mut self, on: bool) -> Self {
        self.async_updates = on;
        self
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("silent", &self.silent)
            .field("performance", &self.performance)
            .field("async_updates", &self.async_updates)
            .field("error_handler", &self.error_handler.as_ref().map(|_| "<handler>"))
            .field("warn_handler", &self.warn_handler.as_ref().map(|_| "<handler>"))
            .finish()
    }
}

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

/// Replace the whole configuration.
pub fn set_config(config: RuntimeConfig) {
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Tweak the configuration in place.
pub fn configure(f: impl FnOnce(&mut RuntimeConfig)) {
    CONFIG.with(|c| f(&mut c.borrow_mut()));
}

pub fn config() -> RuntimeConfig {
    CONFIG.with(|c| c.borrow().clone())
}

/// Route an error to the configured handler, or the log when none is set.
pub fn handle_error(err: Error) {
    let handler = CONFIG.with(|c| c.borrow().error_handler.clone());
    match handler {
        Some(h) => {
            if let Err(p) = catch_unwind(AssertUnwindSafe(|| h(&err))) {
                log::error!("error handler panicked: {}", panic_message(&*p));
                log::error!("{err}");
            }
        }
        None => log::error!("{err}"),
    }
}

pub fn warn(msg: impl AsRef<str>) {
    let (silent, handler) = CONFIG.with(|c| {
        let c = c.borrow();
        (c.silent, c.warn_handler.clone())
    });
    if silent {
        return;
    }
    match handler {
        Some(h) => h(msg.as_ref()),
        None => log::warn!("{}", msg.as_ref()),
    }
}

/// Time `f` when `performance` is on.
pub fn measure<R>(label: impl FnOnce() -> String, f: impl FnOnce() -> R) -> R {
    if !CONFIG.with(|c| c.borrow().performance) {
        return f();
    }
    let start = Instant::now();
    let out = f();
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    log::debug!("{}: {:.3} ms", label(), ms);
    out
}
