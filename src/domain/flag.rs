// src/domain/flag.rs

//! Driver capability flags.

use std::fmt;

/// Execution capability advertised by a driver.
///
/// A driver exposes exactly one `Flag` for its whole lifetime. The flag
/// decides which contract the consumer must use:
///
/// - [`RequiresBlockingExecution`](Flag::RequiresBlockingExecution): drive it
///   through [`BlockingPubSubDriver`](crate::BlockingPubSubDriver), from a
///   single task, one call at a time.
/// - [`RequiresConcurrentExecution`](Flag::RequiresConcurrentExecution): drive
///   it through [`ConcurrentPubSubDriver`](crate::ConcurrentPubSubDriver) and
///   its channel handles, from any number of tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flag {
    /// Publish and receive must never overlap on the same driver instance.
    RequiresBlockingExecution,

    /// Publish and receive may run simultaneously from independent tasks.
    #[default]
    RequiresConcurrentExecution,
}

impl Flag {
    pub fn is_blocking(self) -> bool {
        matches!(self, Flag::RequiresBlockingExecution)
    }

    pub fn is_concurrent(self) -> bool {
        matches!(self, Flag::RequiresConcurrentExecution)
    }

    /// Snake-case label used in logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Flag::RequiresBlockingExecution => "requires_blocking_execution",
            Flag::RequiresConcurrentExecution => "requires_concurrent_execution",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
