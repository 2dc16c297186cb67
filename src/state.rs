use std::sync::Arc;

use crate::config::Config;
use crate::engine::Dispatcher;
use crate::notify::NotificationHub;
use crate::observability::metrics::Metrics;
use crate::store::{
    DeliveryTaskStore, InMemoryProfileDirectory, InMemoryTaskStore, ProfileDirectory,
};

pub struct AppState {
    pub tasks: Arc<dyn DeliveryTaskStore>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub notifications: Arc<NotificationHub>,
    pub dispatcher: Dispatcher,
    pub metrics: Metrics,
}

impl AppState {
    /// Wires the in-memory store and notification hub.
    pub fn new(notification_feed_limit: usize, event_buffer_size: usize) -> Self {
        let tasks: Arc<dyn DeliveryTaskStore> = Arc::new(InMemoryTaskStore::new());
        let profiles: Arc<dyn ProfileDirectory> = Arc::new(InMemoryProfileDirectory::new());
        let notifications = Arc::new(NotificationHub::new(
            notification_feed_limit,
            event_buffer_size,
        ));
        let metrics = Metrics::new();

        let dispatcher = Dispatcher::new(
            tasks.clone(),
            profiles.clone(),
            notifications.clone(),
            metrics.clone(),
        );

        Self {
            tasks,
            profiles,
            notifications,
            dispatcher,
            metrics,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.notification_feed_limit, config.event_buffer_size)
    }
}
