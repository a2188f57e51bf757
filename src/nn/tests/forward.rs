use super::{FF_X_VALUES, feed_forward, sigmoid, traced_network};
use crate::assert_err;
use crate::nn::{ComputationNetwork, FrameRange, Init, NetworkConfig, NetworkError, Phase, TraceEvent};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

#[test]
fn test_evaluate_requires_build() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    assert_err!(network.evaluate(ff.sum), NetworkError::NotBuilt on "sum");
    assert!(network.execution_trace().is_empty());
}

#[test]
fn test_feed_forward_values() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();
    network.evaluate(ff.sum).unwrap();

    let w = network.get_node_value(ff.w).unwrap().clone();
    let x = Tensor::new(&FF_X_VALUES, &[3, 2]);
    let expected = w.mat_mul(&x).sigmoid();

    let y = network.get_node_value(ff.sigmoid).unwrap();
    assert_eq!(y.dims(), (5, 2));
    for (actual, expected) in y.data_as_vec().iter().zip(expected.data_as_vec()) {
        assert_abs_diff_eq!(*actual, expected, epsilon = 1e-6);
    }
    let sum = network.get_node_value(ff.sum).unwrap().number().unwrap();
    assert_abs_diff_eq!(sum, expected.sum(), epsilon = 1e-5);

    // 叶节点不参与计算
    let events: Vec<_> = network.execution_trace().iter().map(|e| e.node).collect();
    assert_eq!(events, vec![ff.times, ff.sigmoid, ff.sum]);
    assert!(network.execution_trace().iter().all(|e| e.phase == Phase::Evaluate && e.frame == FrameRange::AllFrames));
    assert_eq!(network.get_node_stats(ff.x).unwrap().evaluations, 0);
    assert_eq!(network.get_node_stats(ff.times).unwrap().evaluations, 1);
}

#[test]
fn test_evaluate_is_idempotent() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();
    network.evaluate(ff.sum).unwrap();
    let first = network.get_node_value(ff.sum).unwrap().clone();
    let trace_len = network.execution_trace().len();
    let stamp = network.get_node_eval_time_stamp(ff.sum).unwrap();

    network.evaluate(ff.sum).unwrap();
    assert_eq!(network.execution_trace().len(), trace_len);
    assert_eq!(network.get_node_eval_time_stamp(ff.sum).unwrap(), stamp);
    assert_eq!(network.get_node_value(ff.sum).unwrap(), &first);
    assert_eq!(network.get_node_stats(ff.sigmoid).unwrap().evaluations, 1);
}

#[test]
fn test_time_stamps_follow_evaluation_order() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();
    network.evaluate(ff.sum).unwrap();

    let stamp = |id| network.get_node_eval_time_stamp(id).unwrap();
    assert!(stamp(ff.x) < stamp(ff.times));
    assert!(stamp(ff.times) < stamp(ff.sigmoid));
    assert!(stamp(ff.sigmoid) < stamp(ff.sum));
    assert_eq!(network.time_stamp_counter(), stamp(ff.sum));
}

#[test]
fn test_changed_parameter_triggers_recompute() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();
    network.evaluate(ff.sum).unwrap();
    network.clear_execution_trace();

    network.set_node_value(ff.w, &Tensor::zeros(&[5, 3])).unwrap();
    network.evaluate(ff.sum).unwrap();

    let events: Vec<_> = network.execution_trace().iter().map(|e| e.node).collect();
    assert_eq!(events, vec![ff.times, ff.sigmoid, ff.sum]);
    // W为零时每个输出都是sigmoid(0)
    let sum = network.get_node_value(ff.sum).unwrap().number().unwrap();
    assert_abs_diff_eq!(sum, 10.0 * sigmoid(0.0), epsilon = 1e-6);
}

#[test]
fn test_reset_eval_time_stamp_forces_full_recompute() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();
    network.evaluate(ff.sum).unwrap();

    network.reset_eval_time_stamp(ff.sum).unwrap();
    network.clear_execution_trace();
    network.evaluate(ff.sum).unwrap();

    assert_eq!(network.execution_trace().len(), 3);
    for id in [ff.times, ff.sigmoid, ff.sum] {
        assert_eq!(network.get_node_stats(id).unwrap().evaluations, 2);
    }
    assert_eq!(network.get_node_stats(ff.w).unwrap().evaluations, 0);
}

#[test]
fn test_minibatch_size_change() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();
    network.evaluate(ff.sum).unwrap();
    assert_eq!(network.get_node_dims(ff.sigmoid).unwrap(), (5, 2));

    // 下一个小批量有3帧
    network.set_mb_layout(3, 1);
    let x = Tensor::new(&[1.0, 2.0, 3.0, 0.0, 0.0, 0.0, -1.0, -2.0, -3.0], &[3, 3]);
    network.set_node_value(ff.x, &x).unwrap();
    network.evaluate(ff.sum).unwrap();

    assert_eq!(network.get_node_dims(ff.times).unwrap(), (5, 3));
    assert_eq!(network.get_node_dims(ff.sigmoid).unwrap(), (5, 3));
    assert_eq!(network.get_node_dims(ff.sum).unwrap(), (1, 1));

    let w = network.get_node_value(ff.w).unwrap().clone();
    let expected = w.mat_mul(&x).sigmoid().sum();
    let sum = network.get_node_value(ff.sum).unwrap().number().unwrap();
    assert_abs_diff_eq!(sum, expected, epsilon = 1e-5);
}

#[test]
fn test_input_size_must_match_layout() {
    let mut network = traced_network();
    let ff = feed_forward(&mut network).unwrap();
    network.build_and_validate_sub_network(ff.sum).unwrap();

    // 布局仍是2列，读入的却是4列
    network.set_node_value(ff.x, &Tensor::zeros(&[3, 4])).unwrap();
    assert_err!(
        network.evaluate(ff.sum),
        NetworkError::DimensionMismatch { node, .. } if node == "x"
    );
}

#[test]
fn test_nan_check() {
    let config = NetworkConfig {
        check_nan: true,
        ..NetworkConfig::default()
    };
    let mut network = ComputationNetwork::with_config(config);
    let x = network.new_input_node(1, Some("x")).unwrap();
    let w = network.new_parameter_node(1, 1, Init::Values(vec![f32::NAN]), Some("W")).unwrap();
    let times = network.new_times_node(w, x, Some("Wx")).unwrap();
    network.set_mb_layout(2, 1);
    network.set_node_value(x, &Tensor::new(&[1.0, 2.0], &[1, 2])).unwrap();
    network.build_and_validate_sub_network(times).unwrap();

    // 参数本身是叶节点，在结束钩子里就被查出来
    assert_err!(network.evaluate(times), NetworkError::NanDetected on "W");
}

#[test]
fn test_nan_passes_through_without_check() {
    let mut network = ComputationNetwork::new();
    let x = network.new_input_node(1, Some("x")).unwrap();
    let y = network.new_tanh_node(x, Some("y")).unwrap();
    network.set_mb_layout(2, 1);
    network.set_node_value(x, &Tensor::new(&[f32::NAN, 1.0], &[1, 2])).unwrap();
    network.build_and_validate_sub_network(y).unwrap();
    network.evaluate(y).unwrap();

    let value = network.get_node_value(y).unwrap();
    assert!(value[[0, 0]].is_nan());
    assert_abs_diff_eq!(value[[0, 1]], 1.0f32.tanh(), epsilon = 1e-6);
}

#[test]
fn test_gap_columns_are_zeroed() {
    let mut network = traced_network();
    let x = network.new_input_node(1, Some("x")).unwrap();
    let y = network.new_sigmoid_node(x, Some("y")).unwrap();
    // 2条并行序列、2帧；第2条序列在第1帧处为空隙
    network.set_mb_layout(2, 2);
    network.mb_layout().borrow_mut().set_gap(1, 1);
    network.set_node_value(x, &Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[1, 4])).unwrap();
    network.build_and_validate_sub_network(y).unwrap();
    network.evaluate(y).unwrap();

    let value = network.get_node_value(y).unwrap();
    for (j, v) in [1.0, 2.0, 3.0].into_iter().enumerate() {
        assert_abs_diff_eq!(value[[0, j]], sigmoid(v), epsilon = 1e-6);
    }
    assert_eq!(value[[0, 3]], 0.0);
    assert_eq!(
        network.execution_trace(),
        &[TraceEvent {
            node: y,
            phase: Phase::Evaluate,
            frame: FrameRange::AllFrames,
        }]
    );
}
