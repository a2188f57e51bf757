use super::{U_VALUES, feed_four_steps, simple_recurrence, traced_network};
use crate::assert_err;
use crate::nn::{ComputationNetwork, GradientOptions, Init, NetworkError, NodeRole};
use crate::tensor::Tensor;

#[test]
fn test_shapes_and_layouts_after_validation() {
    let mut network = traced_network();
    let r = simple_recurrence(&mut network, false).unwrap();
    feed_four_steps(&mut network, r.x).unwrap();
    network.build_and_validate_sub_network(r.loss).unwrap();

    for id in [r.x, r.ux, r.delay, r.vh, r.plus, r.h] {
        assert_eq!(network.get_node_dims(id).unwrap(), (2, 4));
        assert!(network.node_has_mb_layout(id).unwrap());
    }
    for id in [r.u, r.v] {
        assert_eq!(network.get_node_dims(id).unwrap(), (2, 2));
        assert!(!network.node_has_mb_layout(id).unwrap());
    }
    assert_eq!(network.get_node_dims(r.loss).unwrap(), (1, 1));
    assert!(!network.node_has_mb_layout(r.loss).unwrap());

    // 梯度标记从参数向上传播，输入节点不需要梯度
    assert!(!network.node_needs_gradient(r.x).unwrap());
    for id in [r.u, r.v, r.ux, r.delay, r.vh, r.plus, r.h, r.loss] {
        assert!(network.node_needs_gradient(id).unwrap());
    }
}

#[test]
fn test_revalidation_is_stable() {
    let mut network = traced_network();
    let r = simple_recurrence(&mut network, false).unwrap();
    feed_four_steps(&mut network, r.x).unwrap();
    network.build_and_validate_sub_network(r.loss).unwrap();
    let before: Vec<_> = network
        .nodes()
        .into_iter()
        .map(|id| network.get_node_dims(id).unwrap())
        .collect();

    network.validate_sub_network(r.loss).unwrap();
    let after: Vec<_> = network
        .nodes()
        .into_iter()
        .map(|id| network.get_node_dims(id).unwrap())
        .collect();
    assert_eq!(before, after);
    assert_eq!(network.get_node_value(r.u).unwrap().data_as_vec(), U_VALUES.to_vec());
}

#[test]
fn test_build_is_cached_per_root() {
    let mut network = traced_network();
    let r = simple_recurrence(&mut network, false).unwrap();
    feed_four_steps(&mut network, r.x).unwrap();
    network.build_and_validate_sub_network(r.loss).unwrap();
    assert!(network.built_and_validated_sub_network(r.loss));
    assert!(!network.built_and_validated_sub_network(r.h));

    network.build_and_validate_sub_network(r.loss).unwrap();
    assert_eq!(network.recurrent_loops().len(), 1);

    // 另一个根共用同一个循环
    network.build_and_validate_sub_network(r.h).unwrap();
    assert_eq!(network.recurrent_loops().len(), 1);
    network.evaluate(r.h).unwrap();
}

#[test]
fn test_parameter_shape_inferred_inside_loop() {
    let mut network = traced_network();
    let x = network.new_input_node(2, Some("x")).unwrap();
    let u = network.new_parameter_node(2, 2, Init::Values(U_VALUES.to_vec()), Some("U")).unwrap();
    // V的列数与延迟节点的行数都留待推断
    let v = network.new_parameter_node(2, 0, Init::Constant(0.1), Some("V")).unwrap();
    let delay = network.new_past_value_node(0, 1, Some("h_prev")).unwrap();
    let ux = network.new_times_node(u, x, Some("Ux")).unwrap();
    let vh = network.new_times_node(v, delay, Some("Vh")).unwrap();
    let plus = network.new_plus_node(ux, vh, Some("z")).unwrap();
    let h = network.new_sigmoid_node(plus, Some("h")).unwrap();
    network.set_node_inputs(delay, &[h]).unwrap();
    let loss = network.new_sum_elements_node(h, Some("loss")).unwrap();
    feed_four_steps(&mut network, x).unwrap();

    assert_eq!(network.get_node_dims(v).unwrap(), (2, 0));
    network.build_and_validate_sub_network(loss).unwrap();

    assert_eq!(network.get_node_dims(delay).unwrap(), (2, 4));
    assert_eq!(network.get_node_dims(v).unwrap(), (2, 2));
    assert_eq!(network.get_node_value(v).unwrap().data_as_vec(), vec![0.1; 4]);
    assert_eq!(network.get_node_dims(vh).unwrap(), (2, 4));

    network
        .compute_gradient(loss, &GradientOptions::default())
        .unwrap();
    assert_eq!(network.get_node_grad(v).unwrap().dims(), (2, 2));
}

#[test]
fn test_times_dimension_mismatch() {
    let mut network = ComputationNetwork::new();
    let x = network.new_input_node(4, Some("x")).unwrap();
    let w = network.new_parameter_node(2, 3, Init::Constant(1.0), Some("W")).unwrap();
    let times = network.new_times_node(w, x, Some("Wx")).unwrap();
    network.set_mb_layout(2, 1);
    network.set_node_value(x, &Tensor::zeros(&[4, 2])).unwrap();

    assert_err!(
        network.build_and_validate_sub_network(times),
        NetworkError::DimensionMismatch on "Wx"
    );
    assert!(!network.built_and_validated_sub_network(times));
}

#[test]
fn test_plus_rows_mismatch() {
    let mut network = ComputationNetwork::new();
    let a = network.new_input_node(2, Some("a")).unwrap();
    let b = network.new_input_node(3, Some("b")).unwrap();
    let plus = network.new_plus_node(a, b, Some("a+b")).unwrap();
    assert_err!(
        network.build_and_validate_sub_network(plus),
        NetworkError::DimensionMismatch on "a+b"
    );
}

#[test]
fn test_square_error_shape_mismatch() {
    let mut network = ComputationNetwork::new();
    let y = network.new_input_node(2, Some("y")).unwrap();
    let w = network.new_parameter_node(3, 2, Init::Constant(0.5), Some("W")).unwrap();
    let prediction = network.new_times_node(w, y, Some("prediction")).unwrap();
    let err = network.new_square_error_node(prediction, y, Some("err")).unwrap();
    assert_err!(
        network.build_and_validate_sub_network(err),
        NetworkError::DimensionMismatch on "err"
    );
}

#[test]
fn test_zero_dimension_output() {
    let mut network = ComputationNetwork::new();
    let x = network.new_input_node(0, Some("x")).unwrap();
    let y = network.new_sigmoid_node(x, Some("y")).unwrap();
    assert_err!(
        network.build_and_validate_sub_network(y),
        NetworkError::ZeroDimension { node, rows, .. } if node == "x" && *rows == 0
    );
}

#[test]
fn test_unconnected_delay() {
    let mut network = ComputationNetwork::new();
    let x = network.new_input_node(2, Some("x")).unwrap();
    let d = network.new_past_value_node(2, 1, Some("d")).unwrap();
    let plus = network.new_plus_node(x, d, Some("plus")).unwrap();
    assert_err!(
        network.build_and_validate_sub_network(plus),
        NetworkError::InvalidOperation(msg) if msg.contains("需要1个输入")
    );
}

#[test]
fn test_validate_network_roles() {
    let mut network = traced_network();
    let r = simple_recurrence(&mut network, false).unwrap();
    feed_four_steps(&mut network, r.x).unwrap();

    assert_err!(network.validate_network(false, false), NetworkError::MissingFeatures);
    network.add_node_to_group(NodeRole::Feature, r.x).unwrap();
    assert_err!(network.validate_network(false, false), NetworkError::MissingCriterion);
    network.add_node_to_group(NodeRole::Criterion, r.loss).unwrap();
    assert_err!(network.validate_network(false, false), NetworkError::MissingOutput);
    network.add_node_to_group(NodeRole::Output, r.h).unwrap();
    network.validate_network(false, false).unwrap();

    assert_eq!(network.recurrent_loops().len(), 1);
    // 求值矩阵已按校验后的形状分配
    assert_eq!(network.get_node_grad(r.h).unwrap().dims(), (2, 4));
    assert_eq!(network.get_node_grad(r.u).unwrap().dims(), (2, 2));
}

#[test]
fn test_validate_network_fragment() {
    let mut network = ComputationNetwork::new();
    let x = network.new_input_node(2, Some("x")).unwrap();
    let y = network.new_tanh_node(x, Some("y")).unwrap();
    network.validate_network(true, false).unwrap();

    // 不完整的网络也可以只校验评估节点，且不识别循环
    network.add_node_to_group(NodeRole::Evaluation, y).unwrap();
    network.validate_network(true, false).unwrap();
    assert!(network.recurrent_loops().is_empty());
    assert_eq!(network.get_node_dims(y).unwrap(), (2, 1));

    // 没有准则节点但允许
    network.add_node_to_group(NodeRole::Feature, x).unwrap();
    network.add_node_to_group(NodeRole::Output, y).unwrap();
    network.validate_network(false, true).unwrap();
}

#[test]
fn test_loop_members_must_share_layout() {
    let mut network = ComputationNetwork::new();
    let x = network.new_input_node(1, Some("x")).unwrap();
    let d = network.new_past_value_node(1, 1, Some("d")).unwrap();
    let plus = network.new_plus_node(x, d, Some("p")).unwrap();
    // SumElements的输出不带小批量布局，循环因此无法逐帧执行
    let s = network.new_sum_elements_node(plus, Some("s")).unwrap();
    network.set_node_inputs(d, &[s]).unwrap();
    network.set_mb_layout(2, 1);
    network.set_node_value(x, &Tensor::new(&[1.0, 2.0], &[1, 2])).unwrap();
    network.build_and_validate_sub_network(s).unwrap();
    assert_eq!(network.recurrent_loops().len(), 1);

    assert_err!(network.evaluate(s), NetworkError::LoopLayoutMismatch on "s");
}

#[test]
fn test_final_validation_rejects_changes() {
    let mut network = ComputationNetwork::new();
    let x = network.new_input_node(3, Some("x")).unwrap();
    let w = network.new_parameter_node(5, 3, Init::Constant(0.1), Some("W")).unwrap();
    let times = network.new_times_node(w, x, Some("Wx")).unwrap();
    network.set_mb_layout(2, 1);
    network.set_node_value(x, &Tensor::zeros(&[3, 2])).unwrap();
    network.build_and_validate_sub_network(times).unwrap();

    // 绕过校验改变节点维度后，最终校验会把它改回来，这一变化不被允许
    network.get_node_mut(times).unwrap().value_mut().resize(5, 7);
    let order = network.get_eval_order(times).unwrap();
    assert_err!(
        network.validate_nodes(&order, true),
        NetworkError::NonStableValidation { node, what, .. } if node == "Wx" && what == "维度"
    );
}

#[test]
fn test_final_validation_requires_visited_children() {
    let mut network = ComputationNetwork::new();
    let r = simple_recurrence(&mut network, false).unwrap();
    feed_four_steps(&mut network, r.x).unwrap();
    network.build_and_validate_sub_network(r.loss).unwrap();

    let order = network.get_eval_order(r.loss).unwrap();
    for &id in &order {
        network.get_node_mut(id).unwrap().set_visited(false);
    }
    // 延迟节点的输入h排在后面，Vh进入最终校验时h_prev尚未被访问
    assert_err!(
        network.validate_nodes(&order, true),
        NetworkError::IncompleteValidation on "Vh"
    );
}
