use std::{env, fs};

use anyhow::{Context, Result};
use engine::{EngineErr, Session, SessionBuilder};
use log::{info, warn};
use specs::SolverSpec;

const DEFAULT_SOLVER: &str = "solver.json";

fn main() -> Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var("SOLVER").ok())
        .unwrap_or_else(|| DEFAULT_SOLVER.to_string());

    let raw = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let spec: SolverSpec =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

    let mut session = SessionBuilder::new().build(&spec.session)?;
    session.init_params(spec.model_file.as_deref())?;
    session.init_or_load_sparse(&spec.embedding_files)?;
    if let Some(learning_rate) = spec.learning_rate {
        session.set_learning_rate(learning_rate)?;
    }

    info!(params = session.params_num(), max_iter = spec.max_iter; "solver ready");
    session.start_data_reading()?;

    for iter in 1..=spec.max_iter {
        match session.train() {
            Err(EngineErr::EndOfData) => {
                info!("training data exhausted after {} iterations", iter - 1);
                break;
            }
            ret => ret?,
        }

        if spec.overflow_check {
            match session.check_overflow() {
                Err(e @ EngineErr::NumericOverflow { .. }) => warn!("iteration {iter}: {e}"),
                ret => ret?,
            }
        }

        if every(spec.display, iter) {
            let loss = session.get_current_loss()?;
            info!(iter = iter, loss = loss; "training");
        }

        if every(spec.eval_interval, iter) {
            evaluate(session.as_mut(), spec.eval_batches, iter)?;
        }

        if every(spec.snapshot, iter) {
            session.download_params_to_files(&spec.snapshot_prefix, iter)?;
        }
    }

    info!("training done");
    Ok(())
}

fn every(interval: usize, iter: usize) -> bool {
    interval > 0 && iter % interval == 0
}

fn evaluate(session: &mut dyn Session, batches: usize, iter: usize) -> Result<()> {
    for _ in 0..batches {
        match session.eval() {
            Err(EngineErr::EndOfData) => {
                warn!("evaluation data exhausted");
                break;
            }
            ret => ret?,
        }
    }

    for (name, value) in session.get_eval_metrics() {
        info!("iteration {iter} eval {name} = {value:.6}");
    }

    Ok(())
}
