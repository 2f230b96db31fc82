pub mod event_sink;
pub mod kube;
pub mod repository;

pub use event_sink::EventSink;
pub use kube::{KubeClientFactory, KubeClusterApi};
pub use repository::{
    CustomClusterRepository, RkeClusterRepository, TaskEventRepository, TaskRepository,
};
