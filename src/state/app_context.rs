use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::events::{BroadcastEventBus, Event, EventBus};
use crate::application::ports::BuildRunner;
use crate::clock::Clock;
use crate::config::{AgentSettings, ServerConfig};
use crate::infrastructure::logging::BoundaryLogger;
use crate::manager::QueueManager;

/// AppContext - 핸들러에 주입되는 DI 컨테이너
///
/// QueueManager와 이벤트 버스, 로거, 프로세스 설정을 묶어 제공합니다.
#[derive(Clone)]
pub struct AppContext {
    pub manager: Arc<QueueManager<BroadcastEventBus>>,
    pub event_bus: BroadcastEventBus,
    pub logger: Arc<BoundaryLogger>,
    pub settings: AgentSettings,
}

impl AppContext {
    /// Wire the manager and its infrastructure from a loaded configuration
    pub fn new(
        config: &ServerConfig,
        settings: AgentSettings,
        runner: Arc<dyn BuildRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let logger = Arc::new(BoundaryLogger::new());
        let event_bus = BroadcastEventBus::new_default(logger.clone());

        let manager = Arc::new(QueueManager::new(
            config,
            runner,
            clock,
            event_bus.clone(),
            logger.clone(),
        ));

        Self {
            manager,
            event_bus,
            logger,
            settings,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe()
    }
}
