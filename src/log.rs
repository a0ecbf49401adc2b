//! Loader-internal logging: severity and domain bits over the `log` facade.
//!
//! The filter is parsed exactly once, from `VK_LOADER_DEBUG`, the first time
//! anything logs. Messages carry a severity bit plus optionally a domain bit
//! (layer or driver) so a user can ask for, say, only driver errors.

use std::env;
use std::sync::Once;

bitflags! {
    pub struct LogBits: u32 {
        const ERROR      = 0x0000_0001;
        const WARN       = 0x0000_0002;
        const INFO       = 0x0000_0004;
        const DEBUG      = 0x0000_0008;
        const VALIDATION = 0x0000_0010;
        const PERF       = 0x0000_0020;
        const FATAL      = 0x0000_0040;
        const LAYER      = 0x0000_0100;
        const DRIVER     = 0x0000_0200;
    }
}

const SEVERITY_MASK: u32 = 0x0000_00ff;
const DOMAIN_MASK: u32 = 0x0000_ff00;

static FILTER_INIT: Once = Once::new();
static mut FILTER: LogBits = LogBits::empty();

/// Parses one comma-separated `VK_LOADER_DEBUG` token.
fn parse_token(token: &str) -> LogBits {
    match token.trim() {
        "all" => LogBits::all(),
        "error" => LogBits::ERROR | LogBits::FATAL,
        "warn" => LogBits::WARN,
        "info" => LogBits::INFO,
        "debug" => LogBits::DEBUG,
        "validation" => LogBits::VALIDATION,
        "perf" => LogBits::PERF,
        "layer" => LogBits::LAYER,
        "driver" | "icd" | "implem" => LogBits::DRIVER,
        _ => LogBits::empty(),
    }
}

fn parse_filter(value: &str) -> LogBits {
    value.split(',').map(parse_token).fold(LogBits::empty(), |acc, b| acc | b)
}

/// The active filter. Errors and fatal messages always pass.
pub fn filter() -> LogBits {
    FILTER_INIT.call_once(|| {
        let parsed = env::var("VK_LOADER_DEBUG")
            .map(|v| parse_filter(&v))
            .unwrap_or_else(|_| LogBits::empty());
        unsafe { FILTER = parsed | LogBits::ERROR | LogBits::FATAL }
    });
    unsafe { FILTER }
}

/// Emits `msg` when `bits` pass the filter: the severity bit must be enabled,
/// and if the message names a domain, that domain must not be filtered out.
pub fn log_msg(bits: LogBits, msg: &str) {
    let f = filter();
    let severity = bits.bits() & SEVERITY_MASK;
    if severity & f.bits() == 0 {
        return;
    }
    let domain = bits.bits() & DOMAIN_MASK;
    if domain != 0 && f.bits() & DOMAIN_MASK != 0 && domain & f.bits() == 0 {
        return;
    }
    if bits.intersects(LogBits::ERROR | LogBits::FATAL) {
        error!("{}", msg);
    } else if bits.contains(LogBits::WARN) {
        warn!("{}", msg);
    } else if bits.intersects(LogBits::INFO | LogBits::VALIDATION | LogBits::PERF) {
        info!("{}", msg);
    } else {
        debug!("{}", msg);
    }
}

macro_rules! loader_log {
    ($bits:expr, $($arg:tt)*) => {
        $crate::log::log_msg($bits, &format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_parsing() {
        assert_eq!(parse_filter("error,warn"), LogBits::ERROR | LogBits::FATAL | LogBits::WARN);
        assert_eq!(parse_filter("all"), LogBits::all());
        assert_eq!(parse_filter("driver"), LogBits::DRIVER);
        assert_eq!(parse_filter("bogus"), LogBits::empty());
    }
}
