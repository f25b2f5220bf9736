//! Routes panics through `tracing`.
//!
//! A panicking handler does not take the service down (the registry turns it
//! into an ERROR job), so the panic would otherwise only reach stderr.

use std::backtrace::Backtrace;
use std::panic::{PanicHookInfo, take_hook};
use std::thread;

/// Install a global panic hook that logs the panic, then runs the previous hook.
pub fn install() {
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let location = panic_info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
                .unwrap_or_else(|| "<unknown>".to_string());
            let current = thread::current();
            let thread_name = current.name().unwrap_or("<unnamed>");

            tracing::error!(
                target: "asset_processor::panic",
                thread = thread_name,
                location = %location,
                payload = %panic_payload_to_string(panic_info),
                backtrace = %Backtrace::capture(),
                "Panic"
            );
        }));

        previous_hook(panic_info);
    }));
}

fn panic_payload_to_string(panic_info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = panic_info.payload().downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        return s.clone();
    }
    panic_info.to_string()
}
