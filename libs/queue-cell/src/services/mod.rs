pub mod controller;
pub mod eta;
pub mod locks;
pub mod publisher;
pub mod settings;

pub use controller::QueueController;
pub use publisher::{BroadcastPublisher, EventPublisher, LoggingNotifier, Notifier};
pub use settings::{ConsultationSettings, StaticConsultationSettings};
