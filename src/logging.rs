// SPDX-License-Identifier: MIT
// Client-facing log plumbing: the process-wide minimum level set by
// `logging/setLevel`, and fan-out of `notifications/message` records to
// Ready connections.
//
// The level is shared by every connection by design — clients negotiate a
// common floor. It is a single atomic, so readers always see a consistent
// value.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::connection::{emitter, manager::ConnectionManager};
use crate::protocol::messages::LogMessageParams;
use crate::protocol::types::LogLevel;

const LEVELS: [LogLevel; 8] = [
    LogLevel::Debug,
    LogLevel::Info,
    LogLevel::Notice,
    LogLevel::Warning,
    LogLevel::Error,
    LogLevel::Critical,
    LogLevel::Alert,
    LogLevel::Emergency,
];

fn rank(level: LogLevel) -> u8 {
    LEVELS.iter().position(|l| *l == level).unwrap_or(0) as u8
}

/// Process-wide minimum level for client log notifications.
pub struct ClientLogLevel {
    minimum: AtomicU8,
}

impl Default for ClientLogLevel {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl ClientLogLevel {
    pub fn new(initial: LogLevel) -> Self {
        Self {
            minimum: AtomicU8::new(rank(initial)),
        }
    }

    /// Takes effect immediately for subsequent notifications.
    pub fn set(&self, level: LogLevel) {
        self.minimum.store(rank(level), Ordering::SeqCst);
    }

    pub fn minimum(&self) -> LogLevel {
        LEVELS[self.minimum.load(Ordering::SeqCst) as usize]
    }

    pub fn should_emit(&self, level: LogLevel) -> bool {
        rank(level) >= self.minimum.load(Ordering::SeqCst)
    }
}

/// Send one log record to every Ready connection, subject to the shared
/// minimum level. Returns the delivery count.
pub async fn broadcast_log(
    level_state: &ClientLogLevel,
    connections: &Arc<ConnectionManager>,
    level: LogLevel,
    logger: Option<&str>,
    data: Value,
) -> usize {
    if !level_state.should_emit(level) {
        return 0;
    }
    let params = LogMessageParams {
        level,
        logger: logger.map(str::to_string),
        data,
    };
    let mut delivered = 0;
    for conn in connections.ready_connections().await {
        if emitter::log_message(&conn, &params).await.is_ok() {
            delivered += 1;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_floor_is_info() {
        let state = ClientLogLevel::default();
        assert!(!state.should_emit(LogLevel::Debug));
        assert!(state.should_emit(LogLevel::Info));
        assert!(state.should_emit(LogLevel::Emergency));
    }

    #[test]
    fn set_level_takes_effect_immediately() {
        let state = ClientLogLevel::default();
        state.set(LogLevel::Error);
        assert!(!state.should_emit(LogLevel::Warning));
        assert!(state.should_emit(LogLevel::Error));
        assert_eq!(state.minimum(), LogLevel::Error);

        state.set(LogLevel::Debug);
        assert!(state.should_emit(LogLevel::Debug));
    }
}
