use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use crate::jobs::JobRegistry;
use crate::notifications::LiveChannel;

use super::ServerConfig;

pub type GuardedJobRegistry = Arc<JobRegistry>;
pub type GuardedLiveChannel = Arc<LiveChannel>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub registry: GuardedJobRegistry,
    pub live: GuardedLiveChannel,
}

impl ServerState {
    pub fn new(config: ServerConfig, registry: GuardedJobRegistry, live: GuardedLiveChannel) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            registry,
            live,
        }
    }
}

impl FromRef<ServerState> for GuardedJobRegistry {
    fn from_ref(input: &ServerState) -> Self {
        input.registry.clone()
    }
}

impl FromRef<ServerState> for GuardedLiveChannel {
    fn from_ref(input: &ServerState) -> Self {
        input.live.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
