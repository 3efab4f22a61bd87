mod common;

use common::{scripted_session, synthetic_grad};
use engine::{EngineErr, Session, SessionState};
use specs::OptimizerSpec;

const SGD: OptimizerSpec = OptimizerSpec::GradientDescent { learning_rate: 0.1 };

#[test]
fn learning_rate_changes_apply_from_the_next_iteration() {
    let mut session = scripted_session::<u32, f32>(1, 64, 32, SGD, 1., false);
    session.init_params(None).unwrap();
    session.start_data_reading().unwrap();

    session.train().unwrap();
    let after_first = session.networks()[0].params().to_host();

    session.set_learning_rate(0.01).unwrap();
    session.train().unwrap();
    let after_second = session.networks()[0].params().to_host();

    for i in 0..32 {
        let first_step = i as f32 / 1000. - after_first[i];
        let second_step = after_first[i] - after_second[i];
        assert!((first_step - 0.1 * synthetic_grad(0, i)).abs() < 1e-6);
        assert!((second_step - 0.01 * synthetic_grad(1, i)).abs() < 1e-6);
    }
}

#[test]
fn overflow_is_reported_for_the_replica_holding_it() {
    let mut session = scripted_session::<u32, f32>(2, 64, 16, SGD, 1., false);
    session.init_params(None).unwrap();
    session.start_data_reading().unwrap();
    session.train().unwrap();

    assert!(session.check_overflow().is_ok());

    session.networks_mut()[1].grads_mut().write()[5] = f32::INFINITY;
    match session.check_overflow() {
        Err(EngineErr::NumericOverflow { replica }) => assert!(replica.contains("dense replica 1")),
        other => panic!("expected an overflow, got {other:?}"),
    }

    session.networks_mut()[1].grads_mut().write()[5] = 0.;
    session.embeddings_mut()[0].grad_buffers_mut()[0].write()[0] = f32::NAN;
    match session.check_overflow() {
        Err(EngineErr::NumericOverflow { replica }) => assert!(replica.contains("embedding 0 shard 0")),
        other => panic!("expected an overflow, got {other:?}"),
    }
}

#[test]
fn half_precision_overflow_is_detected() {
    let mut session = scripted_session::<i64, half::f16>(1, 16, 8, SGD, 1024., false);
    session.init_params(None).unwrap();
    session.start_data_reading().unwrap();
    session.train().unwrap();

    session.networks_mut()[0].grads_mut().write()[0] = half::f16::from_f32(1e6);

    assert!(matches!(
        session.check_overflow(),
        Err(EngineErr::NumericOverflow { .. })
    ));
}

#[test]
fn a_panicking_device_faults_the_iteration() {
    let mut session = scripted_session::<u32, f32>(2, 32, 8, SGD, 1., true);
    session.init_params(None).unwrap();
    session.start_data_reading().unwrap();

    assert!(matches!(session.train(), Err(EngineErr::DeviceFault { .. })));
    assert!(matches!(session.train(), Err(EngineErr::DeviceFault { .. })));
    assert!(matches!(
        session.get_current_loss(),
        Err(EngineErr::NotReady(_))
    ));
}

#[test]
fn loss_is_the_mean_over_devices() {
    let mut session = scripted_session::<u32, f32>(2, 32, 8, SGD, 1., false);
    session.init_params(None).unwrap();
    session.start_data_reading().unwrap();

    assert_eq!(session.state(), SessionState::Constructed);
    session.train().unwrap();
    session.train().unwrap();

    assert_eq!(session.get_current_loss().unwrap(), 2.);
    assert_eq!(session.state(), SessionState::Training);
}

#[test]
fn eval_leaves_gradients_and_parameters_alone() {
    let mut session = scripted_session::<u32, f32>(2, 32, 8, SGD, 1., false);
    session.init_params(None).unwrap();
    session.start_data_reading().unwrap();
    session.train().unwrap();

    let params = session.networks()[0].params().to_host();
    let grads = session.networks()[0].grads().to_host();
    let table = session.embeddings()[0].dump();

    session.eval().unwrap();

    assert_eq!(session.state(), SessionState::Evaluating);
    assert_eq!(session.networks()[0].params().to_host(), params);
    assert_eq!(session.networks()[0].grads().to_host(), grads);
    assert_eq!(session.embeddings()[0].dump(), table);
}
