use adaptor_core::AdaptorResult;
use adaptor_rke::AdminCredentials;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;

/// 根据管理员证书生成kubeconfig
pub fn build_kube_config(
    cluster_name: &str,
    api_url: &str,
    credentials: &AdminCredentials,
) -> AdaptorResult<String> {
    let user = format!("kube-admin-{cluster_name}");
    let document = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": cluster_name,
            "cluster": {
                "server": api_url,
                "certificate-authority-data": STANDARD.encode(&credentials.ca_cert),
            },
        }],
        "users": [{
            "name": user,
            "user": {
                "client-certificate-data": STANDARD.encode(&credentials.client_cert),
                "client-key-data": STANDARD.encode(&credentials.client_key),
            },
        }],
        "contexts": [{
            "name": cluster_name,
            "context": {
                "cluster": cluster_name,
                "user": user,
            },
        }],
        "current-context": cluster_name,
    });
    Ok(serde_yaml::to_string(&document)?)
}
