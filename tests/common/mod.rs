// tests/common/mod.rs

#![allow(dead_code)]

use std::time::Duration;

use brokerutil::{Driver, DriverBuilder, Flag};

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(2);

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}

/// A closed loopback driver for the given contract.
pub async fn loopback(id: &str, flag: Flag) -> Driver {
    DriverBuilder::new()
        .driver_id(id)
        .flag(flag)
        .build()
        .await
        .expect("failed to build loopback driver")
}

/// Broker used by the Redis tests; `REDIS_URL` overrides the local default.
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// A channel name no other test run shares.
pub fn unique_channel(prefix: &str) -> String {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static NEXT: AtomicUsize = AtomicUsize::new(0);

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{prefix}-{}-{nanos}-{}", std::process::id(), NEXT.fetch_add(1, Ordering::Relaxed))
}

/// A closed Redis driver on a fresh channel.
pub async fn redis(id: &str, flag: Flag) -> Driver {
    DriverBuilder::new()
        .uri(redis_url())
        .driver_id(id)
        .channel(unique_channel(id))
        .flag(flag)
        .build()
        .await
        .expect("failed to build redis driver")
}
