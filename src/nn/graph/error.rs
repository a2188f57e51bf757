/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 计算网络的错误类型
 */

use crate::nn::NodeId;
use thiserror::Error;

/// 计算网络操作错误类型。涉及某个节点的错误都带上其节点名和运算名。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("未找到节点{0:?}")]
    NodeNotFound(NodeId),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("配置错误：{0}")]
    Config(String),

    // ========== 构建/遍历 ==========
    #[error("节点{node}（{operation}）尚未调用 build_and_validate_sub_network，不能求值")]
    NotBuilt { node: String, operation: String },
    #[error("去掉延迟边后，经过节点{node}（{operation}）的环依然存在")]
    CycleNotBreakable { node: String, operation: String },
    #[error("含节点{node}（{operation}）的循环同时被PastValue和FutureValue闭合")]
    MixedRecurrenceDirection { node: String, operation: String },

    // ========== 校验 ==========
    #[error("节点{node}（{operation}）在最终校验中发生了变化：{what}")]
    NonStableValidation {
        node: String,
        operation: String,
        what: String,
    },
    #[error("节点{node}（{operation}）进入最终校验时仍有子节点未被访问")]
    IncompleteValidation { node: String, operation: String },
    #[error("以{root}为根的子网络经过{passes}轮校验仍有{remaining}个节点未稳定")]
    ValidationStuck {
        root: String,
        passes: usize,
        remaining: usize,
    },
    #[error("节点{node}（{operation}）的输出没有元素：[{rows}, {cols}]")]
    ZeroDimension {
        node: String,
        operation: String,
        rows: usize,
        cols: usize,
    },
    #[error("节点{node}（{operation}）维度不匹配：{message}")]
    DimensionMismatch {
        node: String,
        operation: String,
        message: String,
    },

    // ========== 求值/求梯度 ==========
    #[error("循环内节点必须共享同一小批量布局：节点{node}（{operation}）与{reference}不一致")]
    LoopLayoutMismatch {
        node: String,
        operation: String,
        reference: String,
    },
    #[error("节点{node}（{operation}）属于循环，却被按整个小批量计算梯度")]
    WholeBatchOnLoopNode { node: String, operation: String },
    #[error("节点{node}（{operation}）期望{expected}条并行序列，实际为{actual}")]
    ParallelSequenceMismatch {
        node: String,
        operation: String,
        expected: usize,
        actual: usize,
    },
    #[error("节点{node}（{operation}）的输出含有NaN")]
    NanDetected { node: String, operation: String },

    // ========== 整网校验 ==========
    #[error("网络中没有指定特征节点")]
    MissingFeatures,
    #[error("网络中没有指定训练准则节点")]
    MissingCriterion,
    #[error("网络中没有指定输出节点")]
    MissingOutput,
}
