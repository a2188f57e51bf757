/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ComputationNetwork 打印与描述
 */

use super::super::error::NetworkError;
use super::ComputationNetwork;
use crate::nn::NodeId;
use crate::nn::descriptor::{NetworkDescriptor, NodeDescriptor};
use crate::nn::display::format_dims;
use crate::nn::nodes::raw_node::TraitNode;

impl ComputationNetwork {
    // ========== 打印计算树 ==========

    /// 按求值顺序（`forward_compute`）或梯度顺序列出子网络中的节点，
    /// 每行形如`<Name> -> [<rows>, MBSize <cols>]`。
    /// `print_matrices`时在每行之后附上节点的值（前向）或梯度（反向）。
    ///
    /// 返回打印的文本，同时以 info 级别写入日志。
    pub fn print_computation_tree(
        &mut self,
        root: NodeId,
        forward_compute: bool,
        print_matrices: bool,
    ) -> Result<String, NetworkError> {
        let order = if forward_compute {
            self.get_eval_order(root)?
        } else {
            self.get_gradient_calc_order(root)?
        };

        let mut output = String::new();
        let header = if forward_compute {
            "前向计算节点顺序"
        } else {
            "梯度计算节点顺序"
        };
        output.push_str(&format!("\n打印{header}...\n"));
        for id in order {
            let node = self.get_node(id)?;
            output.push_str(&format!(
                "{} -> {}\n",
                node.name(),
                format_dims(node.rows(), node.cols(), node.has_mb_layout())
            ));
            if print_matrices {
                let matrix = if forward_compute { node.value() } else { node.grad() };
                output.push_str(&format!("{matrix}\n"));
            }
        }

        log::info!("{output}");
        Ok(output)
    }

    // ========== 网络描述（describe）==========

    /// 导出网络的描述符（用于调试、测试快照）
    ///
    /// # 示例
    /// ```ignore
    /// let descriptor = network.describe();
    /// println!("{}", descriptor.to_json()?);
    /// ```
    pub fn describe(&self) -> NetworkDescriptor {
        let layout = {
            let layout = self.mb_layout.borrow();
            (layout.num_time_steps(), layout.num_parallel_sequences())
        };
        let mut descriptor = NetworkDescriptor::new(self.name(), layout);

        // 按 ID 排序节点，确保输出顺序一致
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            descriptor.add_node(NodeDescriptor {
                id: id.0,
                name: node.name().to_string(),
                operation: node.operation_name().to_string(),
                output_shape: vec![node.rows(), node.cols()],
                children: node.children().iter().map(|c| c.0).collect(),
                has_mb_layout: node.has_mb_layout(),
                needs_gradient: node.needs_gradient(),
                part_of_loop: node.is_part_of_loop(),
                params: node.raw_node().describe_params(),
            });
        }

        for info in &self.recurrent_info {
            descriptor.add_loop(
                self.names_of(&info.recurrent_nodes_for_forward),
                info.stepping_direction,
            );
        }
        descriptor
    }
}
