/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 网络节点的显示格式化
 */

use super::NodeId;

/// 格式化网络节点的显示
///
/// # Arguments
/// * `id` - 节点ID
/// * `name` - 节点名称
/// * `operation` - 运算名
///
/// # Returns
/// 返回格式化后的字符串，格式为：`节点[id={}, name={}, op={}]`
pub(in crate::nn) fn format_node_display(id: NodeId, name: &str, operation: &str) -> String {
    format!("节点[id={id}, name={name}, op={operation}]")
}

/// 格式化节点的维度：带布局时为`[<rows>, MBSize <cols>]`，否则为`[<rows>, <cols>]`
pub(in crate::nn) fn format_dims(rows: usize, cols: usize, has_mb_layout: bool) -> String {
    if has_mb_layout {
        format!("[{rows}, MBSize {cols}]")
    } else {
        format!("[{rows}, {cols}]")
    }
}
