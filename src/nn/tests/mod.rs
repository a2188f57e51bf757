mod backward;
mod forward;
mod validation;

use crate::nn::{ComputationNetwork, Init, NetworkConfig, NetworkError, NodeId};
use crate::tensor::Tensor;

/// 带固定种子且记录执行轨迹的网络
fn traced_network() -> ComputationNetwork {
    ComputationNetwork::with_config(NetworkConfig {
        name: "test_network".to_string(),
        seed: Some(42),
        trace_execution: true,
        ..NetworkConfig::default()
    })
}

/// `sum = SumElements(Sigmoid(W · x))`
struct FeedForward {
    x: NodeId,
    w: NodeId,
    times: NodeId,
    sigmoid: NodeId,
    sum: NodeId,
}

/// 3行2列的输入
const FF_X_VALUES: [f32; 6] = [1.0, -2.0, 0.5, 0.0, -1.5, 3.0];

fn feed_forward(network: &mut ComputationNetwork) -> Result<FeedForward, NetworkError> {
    let x = network.new_input_node(3, Some("x"))?;
    let w = network.new_parameter_node(5, 3, Init::Uniform { scale: 0.5 }, Some("W"))?;
    let times = network.new_times_node(w, x, Some("Wx"))?;
    let sigmoid = network.new_sigmoid_node(times, Some("y"))?;
    let sum = network.new_sum_elements_node(sigmoid, Some("sum"))?;
    network.set_mb_layout(2, 1);
    network.set_node_value(x, &Tensor::new(&FF_X_VALUES, &[3, 2]))?;
    Ok(FeedForward {
        x,
        w,
        times,
        sigmoid,
        sum,
    })
}

/// 以中心差分估计`loss`对参数`param`每个元素的偏导（会恢复参数原值）
fn numerical_gradient(
    network: &mut ComputationNetwork,
    loss: NodeId,
    param: NodeId,
) -> Result<Vec<f32>, NetworkError> {
    const EPSILON: f32 = 1e-2;
    let original = network.get_node_value(param)?.clone();
    let (rows, cols) = original.dims();
    let base = original.data_as_vec();
    let mut result = Vec::with_capacity(base.len());
    for i in 0..base.len() {
        let mut perturbed_loss = |delta: f32| -> Result<f32, NetworkError> {
            let mut values = base.clone();
            values[i] += delta;
            network.set_node_value(param, &Tensor::new(&values, &[rows, cols]))?;
            network.evaluate(loss)?;
            Ok(network.get_node_value(loss)?.number().unwrap_or(f32::NAN))
        };
        let plus = perturbed_loss(EPSILON)?;
        let minus = perturbed_loss(-EPSILON)?;
        result.push((plus - minus) / (2.0 * EPSILON));
    }
    network.set_node_value(param, &original)?;
    network.evaluate(loss)?;
    Ok(result)
}

const U_VALUES: [f32; 4] = [0.5, -0.3, 0.2, 0.4];
const V_VALUES: [f32; 4] = [0.1, 0.2, -0.2, 0.3];
/// 2行4列（4个时间步）的输入
const X_VALUES: [f32; 8] = [1.0, 0.0, -1.0, 0.5, 0.5, 1.0, 0.0, -0.5];

/// `h_t = Sigmoid(U · x_t + V · Delay(h))`，`loss = SumElements(h)`
struct Recurrence {
    x: NodeId,
    u: NodeId,
    v: NodeId,
    delay: NodeId,
    ux: NodeId,
    vh: NodeId,
    plus: NodeId,
    h: NodeId,
    loss: NodeId,
}

/// 搭建单层循环网络；`future`为true时用`FutureValue`闭合循环，否则用`PastValue`
fn simple_recurrence(network: &mut ComputationNetwork, future: bool) -> Result<Recurrence, NetworkError> {
    let x = network.new_input_node(2, Some("x"))?;
    let u = network.new_parameter_node(2, 2, Init::Values(U_VALUES.to_vec()), Some("U"))?;
    let v = network.new_parameter_node(2, 2, Init::Values(V_VALUES.to_vec()), Some("V"))?;
    let delay = if future {
        network.new_future_value_node(2, 1, Some("h_next"))?
    } else {
        network.new_past_value_node(2, 1, Some("h_prev"))?
    };
    let ux = network.new_times_node(u, x, Some("Ux"))?;
    let vh = network.new_times_node(v, delay, Some("Vh"))?;
    let plus = network.new_plus_node(ux, vh, Some("z"))?;
    let h = network.new_sigmoid_node(plus, Some("h"))?;
    network.set_node_inputs(delay, &[h])?;
    let loss = network.new_sum_elements_node(h, Some("loss"))?;
    Ok(Recurrence {
        x,
        u,
        v,
        delay,
        ux,
        vh,
        plus,
        h,
        loss,
    })
}

/// 设置4个时间步、1条序列的小批量并写入输入
fn feed_four_steps(network: &mut ComputationNetwork, x: NodeId) -> Result<(), NetworkError> {
    network.set_mb_layout(4, 1);
    network.set_node_value(x, &Tensor::new(&X_VALUES, &[2, 4]))
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// 逐帧手算`simple_recurrence`的输出（初始值0.1），返回每一帧的`h`
fn reference_recurrence(future: bool) -> Vec<[f32; 2]> {
    let mut h = vec![[0.0f32; 2]; 4];
    let mut prev = [0.1f32; 2];
    let frames: Vec<usize> = if future {
        (0..4).rev().collect()
    } else {
        (0..4).collect()
    };
    for t in frames {
        let x = [X_VALUES[t], X_VALUES[4 + t]];
        for i in 0..2 {
            let z = U_VALUES[i * 2] * x[0]
                + U_VALUES[i * 2 + 1] * x[1]
                + V_VALUES[i * 2] * prev[0]
                + V_VALUES[i * 2 + 1] * prev[1];
            h[t][i] = sigmoid(z);
        }
        prev = h[t];
    }
    h
}
