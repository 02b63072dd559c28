//! Builds each built-in capsule, drives it through the host harness and
//! prints the results alongside the raw pointers a host would receive.
//!
//! Usage:
//!   RUST_LOG=debug cargo run -p capsule-kernels --example run_kernels

use capsule_kernels::{host, kernels, Capsule};

fn describe(name: &str, capsule: &Capsule) {
    println!("{}", name);
    println!("  signature: {}", capsule.signature());
    println!("  function:  {:p}", capsule.function_ptr());
    println!("  user_data: {:p} ({} bytes)", capsule.user_data(), capsule.context_len());
}

fn main() -> capsule_kernels::Result<()> {
    env_logger::init();

    let input = [1.0, 2.0, 3.0, 4.0, 5.0];

    let average = kernels::moving_average(3)?;
    describe("moving average (w=3)", &average);
    println!("  {:?} -> {:?}\n", input, host::filter_line(&average, &input, 3)?);

    let stencil = kernels::weighted_stencil(vec![0.25, 0.5, 0.25])?;
    describe("weighted stencil [0.25, 0.5, 0.25]", &stencil);
    println!(
        "  {:?} -> {:?}\n",
        input,
        host::filter_neighbourhoods(&stencil, &input, 3)?
    );

    let mut shift = kernels::coordinate_shift(2.0)?;
    describe("coordinate shift (s=2)", &shift);
    let points = vec![vec![5, 5], vec![0, 3]];
    println!(
        "  {:?} -> {:?}",
        points,
        host::transform_coordinates(&shift, &points, 2)?
    );

    shift.release();
    println!("\nshift capsule released, user_data now {:p}", shift.user_data());
    Ok(())
}
