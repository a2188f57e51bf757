use super::{feed_forward, feed_four_steps, numerical_gradient, sigmoid, simple_recurrence, traced_network};
use crate::assert_err;
use crate::nn::{ComputationNetwork, FrameRange, GradientOptions, Init, MbLayout, NetworkError, NodeId, Phase, TraceEvent};
use std::rc::Rc;
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

fn assert_gradient_matches(network: &mut ComputationNetwork, loss: NodeId, param: NodeId) {
    let analytic = network.get_node_grad(param).unwrap().data_as_vec();
    let numeric = numerical_gradient(network, loss, param).unwrap();
    assert_eq!(analytic.len(), numeric.len());
    for (a, n) in analytic.iter().zip(&numeric) {
        assert_abs_diff_eq!(*a, *n, epsilon = 1e-2);
    }
}

/// `Wx = W · x`，W为`1×2`、x为`2×2`
fn linear(network: &mut ComputationNetwork) -> Result<(NodeId, NodeId, NodeId), NetworkError> {
    let x = network.new_input_node(2, Some("x"))?;
    let w = network.new_parameter_node(1, 2, Init::Constant(1.0), Some("W"))?;
    let times = network.new_times_node(w, x, Some("Wx"))?;
    network.set_mb_layout(2, 1);
    network.set_node_value(x, &Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]))?;
    Ok((x, w, times))
}

#[test]
fn test_feed_forward_gradient() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();
    network
        .compute_gradient(ff.sum, &GradientOptions::default())
        .unwrap();

    assert_eq!(network.get_node_grad(ff.sum).unwrap(), &Tensor::ones(&[1, 1]));
    assert_eq!(network.get_node_grad(ff.w).unwrap().dims(), (5, 3));
    // 输入不需要梯度
    assert!(!network.node_needs_gradient(ff.x).unwrap());
    assert_eq!(network.get_node_grad(ff.x).unwrap(), &Tensor::zeros(&[3, 2]));
    assert_gradient_matches(&mut network, ff.sum, ff.w);
}

#[test]
fn test_recurrence_gradient() {
    for future in [false, true] {
        let mut network = traced_network();
        let r = simple_recurrence(&mut network, future).unwrap();
        feed_four_steps(&mut network, r.x).unwrap();
        network.build_and_validate_sub_network(r.loss).unwrap();
        network
            .compute_gradient(r.loss, &GradientOptions::default())
            .unwrap();

        assert_gradient_matches(&mut network, r.loss, r.u);
        network
            .compute_gradient(r.loss, &GradientOptions::default())
            .unwrap();
        assert_gradient_matches(&mut network, r.loss, r.v);
    }
}

#[test]
fn test_loop_gradient_order() {
    let mut network = traced_network();
    let r = simple_recurrence(&mut network, false).unwrap();
    feed_four_steps(&mut network, r.x).unwrap();
    network.build_and_validate_sub_network(r.loss).unwrap();
    network.evaluate(r.loss).unwrap();
    network.clear_execution_trace();

    network
        .compute_gradient(r.loss, &GradientOptions::default())
        .unwrap();

    let event = |node, frame| TraceEvent {
        node,
        phase: Phase::Gradient,
        frame,
    };
    // 帧逆着步进方向，帧内成员按前向顺序的逆序；叶节点不产生记录
    let mut expected = vec![event(r.loss, FrameRange::AllFrames)];
    for t in (0..4).rev() {
        for id in [r.h, r.plus, r.vh, r.delay] {
            expected.push(event(id, FrameRange::Frame(t)));
        }
    }
    expected.push(event(r.ux, FrameRange::AllFrames));
    assert_eq!(network.execution_trace(), expected.as_slice());

    assert_eq!(network.get_node_stats(r.vh).unwrap().gradient_computations, 4);
    assert!(network.recurrent_loops()[0].completed_gradient);
}

#[test]
fn test_delay_gradient_outside_loop() {
    let mut network = ComputationNetwork::new();
    let x = network.new_input_node(1, Some("x")).unwrap();
    let w = network.new_parameter_node(1, 1, Init::Constant(2.0), Some("W")).unwrap();
    let times = network.new_times_node(w, x, Some("Wx")).unwrap();
    let d = network.new_past_value_node(1, 1, Some("d")).unwrap();
    network.set_node_inputs(d, &[times]).unwrap();
    let loss = network.new_sum_elements_node(d, Some("loss")).unwrap();
    network.set_mb_layout(4, 1);
    network.set_node_value(x, &Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[1, 4])).unwrap();
    network.build_and_validate_sub_network(loss).unwrap();
    network
        .compute_gradient(loss, &GradientOptions::default())
        .unwrap();

    // loss = 0.1 + W·(1 + 2 + 3)
    let value = network.get_node_value(loss).unwrap().number().unwrap();
    assert_abs_diff_eq!(value, 0.1 + 12.0, epsilon = 1e-5);
    assert_abs_diff_eq!(network.get_node_grad(w).unwrap()[[0, 0]], 6.0, epsilon = 1e-6);
    // 最后一帧的值没有被任何一帧读取
    let times_grad = network.get_node_grad(times).unwrap();
    assert_eq!(times_grad.data_as_vec(), vec![1.0, 1.0, 1.0, 0.0]);
}

#[test]
fn test_gradients_accumulate_without_clearing() {
    let mut network = ComputationNetwork::new();
    let (_, w, times) = linear(&mut network).unwrap();
    let sum = network.new_sum_elements_node(times, Some("sum")).unwrap();
    network.build_and_validate_sub_network(sum).unwrap();

    network
        .compute_gradient(sum, &GradientOptions::default())
        .unwrap();
    let first = network.get_node_grad(w).unwrap().clone();
    assert_eq!(first.data_as_vec(), vec![3.0, 7.0]);

    let keep = GradientOptions {
        clear_gradients: false,
        ..GradientOptions::default()
    };
    network.compute_gradient(sum, &keep).unwrap();
    // Wx的梯度累加成2，传给W的贡献也随之翻倍
    assert_eq!(network.get_node_grad(w).unwrap(), &first.scale(3.0));
    assert_eq!(network.get_node_grad(times).unwrap().data_as_vec(), vec![2.0, 2.0]);

    network
        .compute_gradient(sum, &GradientOptions::default())
        .unwrap();
    assert_eq!(network.get_node_grad(w).unwrap(), &first);
}

#[test]
fn test_initial_root_gradient() {
    let mut network = ComputationNetwork::new();
    let (_, w, times) = linear(&mut network).unwrap();
    network.build_and_validate_sub_network(times).unwrap();

    let initial = Tensor::new(&[1.0, -2.0], &[1, 2]);
    let options = GradientOptions {
        reset_root_to_one: false,
        initial_root_gradient: Some(initial.clone()),
        ..GradientOptions::default()
    };
    network.compute_gradient(times, &options).unwrap();
    let expected = vec![-3.0, -5.0];
    assert_eq!(network.get_node_grad(w).unwrap().data_as_vec(), expected);
    assert_eq!(network.get_node_grad(times).unwrap(), &initial);

    // 两个选项都给出时以初始梯度为准
    let both = GradientOptions {
        reset_root_to_one: true,
        initial_root_gradient: Some(initial),
        ..GradientOptions::default()
    };
    network.compute_gradient(times, &both).unwrap();
    assert_eq!(network.get_node_grad(w).unwrap().data_as_vec(), expected);
}

#[test]
fn test_initial_root_gradient_shape_mismatch() {
    let mut network = ComputationNetwork::new();
    let (_, _, times) = linear(&mut network).unwrap();
    network.build_and_validate_sub_network(times).unwrap();

    let options = GradientOptions {
        reset_root_to_one: false,
        initial_root_gradient: Some(Tensor::ones(&[2, 2])),
        ..GradientOptions::default()
    };
    assert_err!(
        network.compute_gradient(times, &options),
        NetworkError::DimensionMismatch { node, .. } if node == "Wx"
    );
}

#[test]
fn test_reset_timestamps_after_gradient() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();
    let options = GradientOptions {
        reset_timestamps: true,
        ..GradientOptions::default()
    };
    network.compute_gradient(ff.sum, &options).unwrap();
    network.clear_execution_trace();

    network.evaluate(ff.sum).unwrap();
    let recomputed: Vec<_> = network
        .execution_trace()
        .iter()
        .filter(|e| e.phase == Phase::Evaluate)
        .map(|e| e.node)
        .collect();
    assert_eq!(recomputed, vec![ff.times, ff.sigmoid, ff.sum]);
}

#[test]
fn test_fixed_parameter_gets_no_gradient() {
    let mut network = ComputationNetwork::new();
    let (_, w, times) = linear(&mut network).unwrap();
    let sum = network.new_sum_elements_node(times, Some("sum")).unwrap();
    network.set_parameter_update_required(w, false).unwrap();
    network.build_and_validate_sub_network(sum).unwrap();

    assert!(!network.node_needs_gradient(w).unwrap());
    assert!(!network.node_needs_gradient(times).unwrap());
    network
        .compute_gradient(sum, &GradientOptions::default())
        .unwrap();
    assert_eq!(network.get_node_grad(w).unwrap(), &Tensor::zeros(&[1, 2]));
}

#[test]
fn test_gap_columns_get_no_gradient() {
    let mut network = ComputationNetwork::new();
    let x = network.new_input_node(1, Some("x")).unwrap();
    let w = network.new_parameter_node(1, 1, Init::Constant(0.5), Some("W")).unwrap();
    let times = network.new_times_node(w, x, Some("Wx")).unwrap();
    let y = network.new_sigmoid_node(times, Some("y")).unwrap();
    let loss = network.new_sum_elements_node(y, Some("loss")).unwrap();
    network.set_mb_layout(2, 2);
    network.mb_layout().borrow_mut().set_gap(1, 1);
    let inputs = [1.0f32, 2.0, 3.0, 4.0];
    network.set_node_value(x, &Tensor::new(&inputs, &[1, 4])).unwrap();
    network.build_and_validate_sub_network(loss).unwrap();
    network
        .compute_gradient(loss, &GradientOptions::default())
        .unwrap();

    // 只有前3列有数据
    let expected: f32 = inputs[..3]
        .iter()
        .map(|&v| {
            let s = sigmoid(0.5 * v);
            s * (1.0 - s) * v
        })
        .sum();
    assert_abs_diff_eq!(network.get_node_grad(w).unwrap()[[0, 0]], expected, epsilon = 1e-6);
    assert_eq!(network.get_node_grad(y).unwrap()[[0, 3]], 0.0);
}

#[test]
fn test_future_loop_gradient_runs_forwards() {
    let mut network = traced_network();
    let r = simple_recurrence(&mut network, true).unwrap();
    feed_four_steps(&mut network, r.x).unwrap();
    network.build_and_validate_sub_network(r.loss).unwrap();
    network
        .compute_gradient(r.loss, &GradientOptions::default())
        .unwrap();

    let frames: Vec<FrameRange> = network
        .execution_trace()
        .iter()
        .filter(|e| e.node == r.h && e.phase == Phase::Gradient)
        .map(|e| e.frame)
        .collect();
    assert_eq!(
        frames,
        (0..4).map(FrameRange::Frame).collect::<Vec<_>>()
    );
}

#[test]
fn test_reset_root_to_one_requires_scalar_root() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sigmoid).unwrap();

    // y为5×2，不能把梯度置为1
    assert_err!(
        network.compute_gradient(ff.sigmoid, &GradientOptions::default()),
        NetworkError::DimensionMismatch on "y"
    );
    assert!(
        network
            .execution_trace()
            .iter()
            .all(|e| e.phase == Phase::Evaluate)
    );

    // 给出同形的初始梯度即可
    let options = GradientOptions {
        reset_root_to_one: false,
        initial_root_gradient: Some(Tensor::ones(&[5, 2])),
        ..GradientOptions::default()
    };
    network.compute_gradient(ff.sigmoid, &options).unwrap();
    assert_eq!(network.get_node_grad(ff.w).unwrap().dims(), (5, 3));
}

#[test]
fn test_loop_member_cannot_take_whole_batch_gradient() {
    let mut network = ComputationNetwork::new();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();

    // 标记为循环成员却不属于任何已识别的循环
    network.get_node_mut(ff.times).unwrap().set_part_of_loop(true);
    assert_err!(
        network.compute_gradient(ff.sum, &GradientOptions::default()),
        NetworkError::WholeBatchOnLoopNode on "Wx"
    );
}

#[test]
fn test_loop_parallel_sequences_must_match_network() {
    let mut network = ComputationNetwork::new();
    let r = simple_recurrence(&mut network, false).unwrap();
    feed_four_steps(&mut network, r.x).unwrap();
    network.build_and_validate_sub_network(r.loss).unwrap();
    network.evaluate(r.loss).unwrap();

    // 循环成员共用另一个2帧 × 2条序列的布局（列数不变）
    let other = MbLayout::new_shared(2, 2);
    for id in [r.delay, r.vh, r.plus, r.h] {
        network
            .get_node_mut(id)
            .unwrap()
            .set_mb_layout(Some(Rc::clone(&other)));
    }
    assert_err!(
        network.compute_gradient(r.loss, &GradientOptions::default()),
        NetworkError::ParallelSequenceMismatch { node, expected, actual, .. }
            if node == "h" && *expected == 1 && *actual == 2
    );
}
