use thiserror::Error;

/// 云适配器错误类型定义
///
/// 每个变体都有稳定的数字错误码（见 [`AdaptorError::code`]），
/// 供任务事件和界面展示使用。
#[derive(Debug, Error)]
pub enum AdaptorError {
    #[error("不支持的云服务提供商: {0}")]
    ProviderNotSupported(String),

    #[error("缺少访问密钥")]
    AccessKeyMissing,

    #[error("访问密钥不匹配")]
    AccessKeyMismatch,

    #[error("上一个任务尚未完成: {0}")]
    LastTaskNotComplete(String),

    #[error("无法访问Kubernetes API: {0}")]
    KubeApiUnreachable(String),

    #[error("集群节点列表为空")]
    ClusterNodeEmpty,

    #[error("集群缺少{role}角色的节点")]
    ClusterNodeRoleMiss { role: String },

    #[error("ETCD节点数量必须为奇数, 当前数量: {0}")]
    EtcdNodeNotOddNumber(usize),

    #[error("节点IP地址无效: {0}")]
    ClusterNodeIpInvalid(String),

    #[error("节点SSH端口无效: {0}")]
    ClusterNodePortInvalid(String),

    #[error("集群kubeconfig为空")]
    KubeConfigEmpty,

    #[error("集群不存在: {0}")]
    ClusterNotFound(String),

    #[error("集群已安装Rainbond, 不允许删除: {0}")]
    ClusterNotAllowDelete(String),

    #[error("当前集群不支持重新安装")]
    NotSupportReinstall,

    #[error("当前集群不支持更新Kubernetes")]
    NotSupportUpdateKubernetes,

    #[error("配置无效: {0}")]
    ConfigInvalid(String),

    #[error("RKE配置不正确: {0}")]
    IncorrectRkeConfig(String),

    #[error("RKE配置丢失")]
    RkeConfigLost,

    #[error("SSH密钥文件不存在: {0}")]
    SshFileNotFound(String),

    #[error("SSH密钥解析失败: {0}")]
    SshParse(String),

    #[error("SSH连接失败: {0}")]
    SshConnect(String),

    #[error("应用商店不存在: {0}")]
    AppStoreNotFound(String),

    #[error("应用商店名称冲突: {0}")]
    AppStoreNameConflict(String),

    #[error("应用模板不存在: {0}")]
    AppTemplateNotFound(String),

    #[error("模板版本不存在: {0}")]
    TemplateVersionNotFound(String),

    #[error("名称冲突: {0}")]
    NameConflict(String),

    #[error("任务不存在: {0}")]
    TaskNotFound(String),

    #[error("数据库错误: {0}")]
    Database(sqlx::Error),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("Kubernetes客户端错误: {0}")]
    Kube(String),

    #[error("{0}")]
    Engine(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("操作已取消")]
    Cancelled,

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("无效的参数: {0}")]
    InvalidParameter(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type AdaptorResult<T> = std::result::Result<T, AdaptorError>;

impl AdaptorError {
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        Self::Engine(msg.into())
    }

    pub fn kube<S: Into<String>>(msg: S) -> Self {
        Self::Kube(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn cluster_not_found<S: Into<String>>(id: S) -> Self {
        Self::ClusterNotFound(id.into())
    }

    /// 稳定的数字错误码，未归类的错误统一为500
    pub fn code(&self) -> u32 {
        match self {
            AdaptorError::ProviderNotSupported(_) => 7001,
            AdaptorError::AccessKeyMissing => 7002,
            AdaptorError::AccessKeyMismatch => 7003,
            AdaptorError::LastTaskNotComplete(_) => 7004,
            AdaptorError::KubeApiUnreachable(_) => 7005,
            AdaptorError::ClusterNodeEmpty => 7006,
            AdaptorError::ClusterNodeRoleMiss { .. } => 7007,
            AdaptorError::EtcdNodeNotOddNumber(_) => 7008,
            AdaptorError::ClusterNodeIpInvalid(_) => 7009,
            AdaptorError::ClusterNodePortInvalid(_) => 7010,
            AdaptorError::KubeConfigEmpty => 7011,
            AdaptorError::ClusterNotFound(_) => 7012,
            AdaptorError::ClusterNotAllowDelete(_) => 7013,
            AdaptorError::NotSupportReinstall => 7014,
            AdaptorError::NotSupportUpdateKubernetes => 7015,
            AdaptorError::ConfigInvalid(_) => 7016,
            AdaptorError::IncorrectRkeConfig(_) => 7017,
            AdaptorError::RkeConfigLost => 7018,
            AdaptorError::SshFileNotFound(_) => 7019,
            AdaptorError::SshParse(_) => 7020,
            AdaptorError::SshConnect(_) => 7021,
            AdaptorError::AppStoreNotFound(_) => 7022,
            AdaptorError::AppStoreNameConflict(_) => 7023,
            AdaptorError::AppTemplateNotFound(_) => 7024,
            AdaptorError::TemplateVersionNotFound(_) => 7025,
            AdaptorError::NameConflict(_) => 409,
            AdaptorError::TaskNotFound(_) => 404,
            AdaptorError::Cancelled => 499,
            AdaptorError::InvalidParameter(_) => 400,
            _ => 500,
        }
    }

    /// 是否为集群不存在错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AdaptorError::ClusterNotFound(_) | AdaptorError::TaskNotFound(_)
        )
    }

    /// 面向用户的提示信息
    pub fn user_message(&self) -> &str {
        match self {
            AdaptorError::LastTaskNotComplete(_) => "上一个任务尚未完成，请稍后重试",
            AdaptorError::KubeApiUnreachable(_) => "无法连接集群API，请检查集群状态",
            AdaptorError::ClusterNodeEmpty => "请至少添加一个节点",
            AdaptorError::ClusterNodeRoleMiss { .. } => "节点需要同时包含 controlplane、etcd 与 worker 角色",
            AdaptorError::EtcdNodeNotOddNumber(_) => "ETCD节点数量必须为奇数",
            AdaptorError::ClusterNodeIpInvalid(_) => "节点IP地址格式不正确",
            AdaptorError::ClusterNodePortInvalid(_) => "节点SSH端口不正确",
            AdaptorError::KubeConfigEmpty => "集群kubeconfig为空",
            AdaptorError::ClusterNotFound(_) => "集群不存在",
            AdaptorError::ClusterNotAllowDelete(_) => "集群已安装Rainbond，请先卸载后再删除",
            AdaptorError::NameConflict(_) => "名称已存在",
            AdaptorError::SshConnect(_) => "无法通过SSH连接节点",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<sqlx::Error> for AdaptorError {
    fn from(err: sqlx::Error) -> Self {
        let duplicate = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if duplicate {
            AdaptorError::NameConflict(err.to_string())
        } else {
            AdaptorError::Database(err)
        }
    }
}

impl From<serde_json::Error> for AdaptorError {
    fn from(err: serde_json::Error) -> Self {
        AdaptorError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AdaptorError {
    fn from(err: serde_yaml::Error) -> Self {
        AdaptorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for AdaptorError {
    fn from(err: anyhow::Error) -> Self {
        AdaptorError::Internal(err.to_string())
    }
}
