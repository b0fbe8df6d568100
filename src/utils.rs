use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parkcam=info"));
    let fmt_layer = fmt::layer().with_timer(fmt::time::uptime());

    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

/// Pin the calling thread to `core`. Returns false if the core is unknown or
/// the OS refused.
pub fn pin_to_core(core: usize) -> bool {
    let Some(ids) = core_affinity::get_core_ids() else {
        warn!("CPU core ids unavailable, not pinning");
        return false;
    };
    match ids.into_iter().find(|id| id.id == core) {
        Some(id) if core_affinity::set_for_current(id) => {
            info!("Polling loop pinned to core {}", core);
            true
        }
        _ => {
            warn!("Could not pin polling loop to core {}", core);
            false
        }
    }
}

/// Hold the current display state while the hardware settles.
pub fn settle(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
