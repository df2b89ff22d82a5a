//! 公共工具：日志输出、计时与 panic hook。

use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Logger> = OnceCell::new();

pub struct Logger {
    prefix: Option<String>,
}

impl Logger {
    fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    pub fn log(&self, message: &str) {
        match &self.prefix {
            Some(prefix) => write_line(&format!("[{prefix}] {message}")),
            None => write_line(message),
        }
    }
}

/// 初始化全局日志前缀，重复调用时保留第一次的配置。
pub fn init_logger(prefix: Option<String>) {
    LOGGER.get_or_init(|| Logger::new(prefix));
}

pub fn log(message: &str) {
    match LOGGER.get() {
        Some(logger) => logger.log(message),
        None => write_line(message),
    }
}

#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        $crate::utils::log(&format!($($arg)*))
    };
}

#[cfg(target_arch = "wasm32")]
fn write_line(line: &str) {
    web_sys::console::log_1(&line.into());
}

// 非 wasm 目标（单元测试、基准）没有 JS 宿主，直接写 stderr。
#[cfg(not(target_arch = "wasm32"))]
fn write_line(line: &str) {
    eprintln!("{line}");
}

/// 当前时间戳（毫秒）。
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    web_sys::js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[cfg(feature = "console_error_panic_hook")]
pub fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
pub fn set_panic_hook() {}
