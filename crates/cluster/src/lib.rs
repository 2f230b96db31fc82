//! # 集群管理
//!
//! - [`health`] - 集群健康探测
//! - [`lifecycle`] - RKE集群安装与扩容
//! - [`adaptor`] - 提供商适配接口与工厂

pub mod adaptor;
pub mod custom_adaptor;
pub mod kubeconfig;
pub mod lifecycle;
pub mod health;
pub mod rke_adaptor;

pub use adaptor::{AdaptorFactory, ClusterAdaptor, CreateClusterRequest, CUSTOM_PROVIDER, RKE_PROVIDER};
pub use custom_adaptor::CustomAdaptor;
pub use kubeconfig::build_kube_config;
pub use lifecycle::{CreateKubernetesRequest, ExpansionNodeRequest, RkeLifecycle, STATE_FILE_MISSING};
pub use health::{HealthChecker, HealthReport, Version};
pub use rke_adaptor::RkeAdaptor;
