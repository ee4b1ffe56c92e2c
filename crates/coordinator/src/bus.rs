//! In-process event bus decoupling the Reputation Engine from the Job
//! Distributor (Design Notes §9) — neither holds a direct reference to the
//! other; both just publish/subscribe `CoordinatorEvent`s over a shared
//! `tokio::sync::broadcast` channel.

use tokio::sync::broadcast;
use uuid::Uuid;

use ciro_common::types::WorkerStatus;

/// Facts one coordinator subsystem publishes for others to react to.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    HealthChanged { worker_id: Uuid, health_score: f64 },
    ReputationChanged { worker_id: Uuid, score: f64 },
    WorkerBanned { worker_id: Uuid },
    WorkerStatusChanged { worker_id: Uuid, status: WorkerStatus },
    JobAssigned { job_id: Uuid, worker_id: Uuid },
    JobCompleted { job_id: Uuid, worker_id: Uuid },
    JobFailed { job_id: Uuid, worker_id: Uuid },
    JobTimedOut { job_id: Uuid },
    RefundRequired { job_id: Uuid, submitter: String },
    WorkerSlashed { worker_id: Uuid, amount: String },
    WorkerUnbanned { worker_id: Uuid },
}

/// A cloneable handle onto a shared broadcast channel. Clone to hand
/// another subsystem its own receiver.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// A lagging or absent subscriber is not an error — the bus is
    /// best-effort fan-out, not a durable queue.
    pub fn publish(&self, event: CoordinatorEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
