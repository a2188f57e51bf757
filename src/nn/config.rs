/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 计算网络的配置，可从JSON读入，缺省字段取默认值
 */

use super::NetworkError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 网络名（只用于诊断输出）
    pub name: String,
    /// 参数初始化所用随机数生成器的种子；None 表示取自系统熵
    pub seed: Option<u64>,
    /// 每个节点计算结束时检查输出是否含NaN
    pub check_nan: bool,
    /// 在内存中记录每一次前向/反向节点调用
    pub trace_execution: bool,
    /// 延迟节点默认的初始值
    pub delay_initial_value: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "default_network".to_string(),
            seed: None,
            check_nan: false,
            trace_execution: false,
            delay_initial_value: 0.1,
        }
    }
}

impl NetworkConfig {
    pub fn from_json_str(json: &str) -> Result<Self, NetworkError> {
        serde_json::from_str(json).map_err(|e| NetworkError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, NetworkError> {
        serde_json::to_string_pretty(self).map_err(|e| NetworkError::Config(e.to_string()))
    }
}
