/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 网络描述符（Network Descriptor）
 *                 校验后网络结构的可序列化快照，用于调试输出和测试
 */

use crate::nn::layout::SteppingDirection;
use serde::{Deserialize, Serialize};

/// 网络的可序列化描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    /// 格式版本（用于向后兼容）
    pub version: String,
    /// 网络名称
    pub name: String,
    /// 小批量布局`(T, S)`
    pub layout: (usize, usize),
    /// 所有节点描述（按节点 ID 排序）
    pub nodes: Vec<NodeDescriptor>,
    /// 已识别出的循环
    pub loops: Vec<LoopDescriptor>,
}

/// 节点描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// 节点 ID
    pub id: u64,
    /// 节点名称
    pub name: String,
    /// 运算名（如"Times"）
    pub operation: String,
    /// 输出形状`[rows, cols]`
    pub output_shape: Vec<usize>,
    /// 子节点（输入）ID 列表，顺序即输入顺序
    pub children: Vec<u64>,
    pub has_mb_layout: bool,
    pub needs_gradient: bool,
    pub part_of_loop: bool,
    /// 构造参数（仅部分节点有）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
}

/// 循环描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopDescriptor {
    /// 按循环内前向顺序排列的成员名
    pub members: Vec<String>,
    /// `+1`为正向（PastValue），`-1`为反向（FutureValue）
    pub direction: i32,
}

impl NetworkDescriptor {
    pub fn new(name: &str, layout: (usize, usize)) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            name: name.to_string(),
            layout,
            nodes: Vec::new(),
            loops: Vec::new(),
        }
    }

    /// 添加节点描述
    pub fn add_node(&mut self, node: NodeDescriptor) {
        self.nodes.push(node);
    }

    pub fn add_loop(&mut self, members: Vec<String>, direction: SteppingDirection) {
        self.loops.push(LoopDescriptor {
            members,
            direction: direction.sign(),
        });
    }

    /// 获取可学习参数的元素总数
    pub fn total_params(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.operation == "LearnableParameter")
            .map(|n| n.output_shape.iter().product::<usize>())
            .sum()
    }

    /// 转换为 JSON 字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 从 JSON 字符串解析
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
