use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, ValueEnum};

use hiertensor::report::Report;
use hiertensor::*;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Op {
    Add,
    Sub,
    Mul,
}

impl Op {
    fn expr(&self, a: Expr, b: Expr) -> Expr {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
        }
    }

    fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
        }
    }
}

/// Compute an element-wise expression over two generated vectors, each with a value of `i`
/// at every coordinate `i` which is a multiple of 2 or 3.
#[derive(Clone, Debug, Parser)]
#[command(name = "hiertensor")]
struct Config {
    #[arg(long = "length", default_value_t = 10000)]
    pub length: usize,

    #[arg(long = "left", default_value = "sparse")]
    pub left: Format,

    #[arg(long = "right", default_value = "sparse")]
    pub right: Format,

    #[arg(long = "output", default_value = "sparse")]
    pub output: Format,

    #[arg(long = "op", value_enum, default_value_t = Op::Add)]
    pub op: Op,

    /// Print the report as JSON
    #[arg(long = "json")]
    pub json: bool,

    #[arg(long = "log_level", default_value = "warn")]
    pub log_level: String,
}

fn operand(name: &str, length: usize, format: Format) -> HTResult<Access> {
    let entries = (0..length)
        .filter(|i| i % 2 == 0 || i % 3 == 0)
        .map(|i| (vec![i], i as f64))
        .collect();

    let tensor = Storage::pack(vec![length].into(), format, entries)?;
    Access::new(name, Arc::new(tensor), vec![IndexVar::new("i")])
}

// every stored value must match the operator applied to the operands' logical content
fn verify(op: Op, a: &Storage, b: &Storage, output: &Storage) -> HTResult<bool> {
    let (a, b) = (a.to_dense()?, b.to_dense()?);

    for (coord, value) in output.entries()? {
        let i = coord[0];
        if value != op.apply(a[i], b[i]) {
            log::warn!("output value {} at {} does not match its operands", value, i);
            return Ok(false);
        }
    }

    Ok(true)
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let a = operand("a", config.length, config.left.clone())?;
    let b = operand("b", config.length, config.right.clone())?;
    let expr = config.op.expr(a.clone().into(), b.clone().into());

    let start = Instant::now();
    let output = assemble(expr.clone(), config.output.clone())?;
    let assembled = start.elapsed();
    let output = compute(output)?;
    log::info!(
        "assembled {} in {:?} and computed it in {:?}",
        expr,
        assembled,
        start.elapsed() - assembled
    );

    let verified = verify(config.op, a.tensor(), b.tensor(), &output)?;
    let report = Report::new(&expr, &output, verified)?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    Ok(())
}
