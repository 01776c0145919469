use std::{cell::RefCell, env, fs, rc::Rc};

use anyhow::{Context, Result};
use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};
use sketched_adam::{
    Gradient, Parameter, SketchedAdam, SparseRows, initialization::RandParamGen,
    specs::TrainingSpec,
};

const EMBEDDING: &str = "embedding";
const PROJECTION: &str = "projection";

fn load_spec() -> Result<TrainingSpec> {
    let Some(path) = env::args().nth(1) else {
        return Ok(TrainingSpec::default());
    };

    let raw = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))
}

/// Gradient of `0.5 * |e_k - t_k|²` summed over the looked-up rows.
fn embedding_grad(
    param: &Parameter,
    targets: &[f32],
    keys: Vec<i64>,
) -> sketched_adam::Result<(f32, Gradient)> {
    let width = param.width();
    let mut loss = 0.;
    let values = keys
        .iter()
        .flat_map(|&key| {
            let offset = key as usize * width;
            param.data()[offset..offset + width]
                .iter()
                .zip(&targets[offset..offset + width])
                .map(|(e, t)| e - t)
        })
        .inspect(|diff| loss += 0.5 * diff * diff)
        .collect();

    let mut grad = SparseRows::new(param.rows(), width, keys, values)?;
    if !grad.is_coalesced() {
        grad = grad.coalesce();
    }
    Ok((loss, Gradient::Sparse(grad)))
}

/// Gradient of `0.5 * |W - W*|²`.
fn projection_grad(param: &Parameter, targets: &[f32]) -> (f32, Gradient) {
    let grad: Vec<f32> = param.data().iter().zip(targets).map(|(w, t)| w - t).collect();
    let loss = grad.iter().map(|d| 0.5 * d * d).sum();
    (loss, Gradient::Dense(grad))
}

fn main() -> Result<()> {
    env_logger::init();

    let spec = load_spec()?;
    let rng = Rc::new(RefCell::new(match spec.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }));

    let (rows, dim) = (spec.embedding_rows, spec.embedding_dim);
    let emb_len = rows * dim;
    let proj_len = spec.projection_rows * dim;

    let embedding = Parameter::generate(
        EMBEDDING,
        rows,
        dim,
        &mut RandParamGen::embedding(rng.clone(), emb_len, dim)?,
    )?;
    let projection = Parameter::generate(
        PROJECTION,
        spec.projection_rows,
        dim,
        &mut RandParamGen::uniform(rng.clone(), proj_len, -0.1, 0.1)?,
    )?;

    let emb_targets = Parameter::generate(
        "embedding_targets",
        rows,
        dim,
        &mut RandParamGen::embedding(rng.clone(), emb_len, dim)?,
    )?;
    let proj_targets = Parameter::generate(
        "projection_targets",
        spec.projection_rows,
        dim,
        &mut RandParamGen::uniform(rng.clone(), proj_len, -1., 1.)?,
    )?;

    let mut optimizer = SketchedAdam::new();
    optimizer.add_param_group(spec.embedding, vec![embedding])?;
    optimizer.add_param_group(spec.projection, vec![projection])?;

    info!(
        steps = spec.steps,
        rows = rows,
        dim = dim,
        batch_size = spec.batch_size;
        "starting training"
    );

    let log_every = (spec.steps / 10).max(1);
    for step in 1..=spec.steps {
        let keys: Vec<i64> = (0..spec.batch_size)
            .map(|_| rng.borrow_mut().random_range(0..rows.max(1) as i64))
            .collect();

        let (loss, report) = optimizer.step_with(|optimizer| {
            let mut loss = 0.;
            if let Some(param) = optimizer.param_mut(EMBEDDING) {
                let (emb_loss, grad) = embedding_grad(param, emb_targets.data(), keys)?;
                param.set_grad(grad)?;
                loss += emb_loss;
            }
            if let Some(param) = optimizer.param_mut(PROJECTION) {
                let (proj_loss, grad) = projection_grad(param, proj_targets.data());
                param.set_grad(grad)?;
                loss += proj_loss;
            }
            Ok(loss)
        })?;
        optimizer.zero_grad();

        for (name, diagnostic) in &report.diagnostics {
            info!(
                param = name.as_str(),
                step = diagnostic.step,
                exp_avg_error = diagnostic.exp_avg_error,
                exp_avg_sq_error = diagnostic.exp_avg_sq_error;
                "sketch diagnostics"
            );
        }

        if step % log_every == 0 || step == spec.steps {
            info!(step = step, loss = loss, updated = report.updated; "training");
        }
    }

    Ok(())
}
