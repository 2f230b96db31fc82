//! # RKE 安装引擎编排
//!
//! 通过 [`engine::RkeEngine`] 接口驱动外部安装引擎，实现集群配置初始化、
//! 安装/升级、证书轮换、加密密钥轮换与CSR生成。所有引擎原语都在
//! [`engine::EngineContext`] 的取消令牌保护下执行。

pub mod cluster;
pub mod csr;
pub mod engine;
pub mod init;
pub mod log;
pub mod options;
pub mod rotate;
pub mod simulated;
pub mod state;
pub mod up;

pub use cluster::{AdminCredentials, KubeCluster, UpOutcome, KUBE_API_PORT};
pub use csr::generate_csrs;
pub use engine::{EngineContext, RkeEngine};
pub use init::cluster_init;
pub use log::EngineLog;
pub use options::{ExternalFlags, RetryPolicy};
pub use simulated::SimulatedEngine;
pub use state::{CertificateBundle, CertificatePki, FullState, RkeState};
pub use up::cluster_up;
