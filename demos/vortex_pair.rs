//! # Counter rotating vortex pair
//! ```text
//! d omega / dt = - J(psi, omega) + nu laplacian(omega)
//! ```
//! Drives [`FdStepper`] through the [`Integrate`] trait and reports
//! enstrophy and kinetic energy every few steps.
//!
//! Run example:
//!
//! ```text
//! cargo run --example vortex_pair --release
//! ```
use rustvort::field::{IcKind, InitialCondition, VorticityField};
use rustvort::grid::cache::OperatorCache;
use rustvort::vorticity::FdStepper;
use rustvort::{integrate, Integrate, Result};

struct VortexPair {
    stepper: FdStepper,
    field: VorticityField,
    step: usize,
    time: f64,
}

impl Integrate for VortexPair {
    fn update(&mut self) -> Result<()> {
        self.step += 1;
        self.stepper.step(&mut self.field, self.step, self.time)?;
        self.time += self.stepper.dt;
        Ok(())
    }

    fn get_time(&self) -> f64 {
        self.time
    }

    fn get_dt(&self) -> f64 {
        self.stepper.dt
    }

    fn callback(&mut self) -> Result<()> {
        let psi = self.stepper.poisson().streamfunction(&self.field.omega)?;
        println!(
            "time = {:6.3}  enstrophy = {:.6e}  energy = {:.6e}  peak = {:.4}",
            self.time,
            self.field.enstrophy(),
            self.field.kinetic_energy(&psi),
            self.field.peak()
        );
        Ok(())
    }
}

fn main() -> Result<()> {
    let (n, length) = (128, 8.);
    let (nu, dt) = (1e-3, 5e-3);
    let ic = InitialCondition::from_coefficients(
        IcKind::VortexPair,
        &[1.0, 0.4, -0.6, 0.0, -1.0, 0.4, 0.6, 0.0],
    )?;
    let ops = OperatorCache::new().get_or_build(n, n, length, length)?;
    let field = VorticityField::from_initial(ops.grid.clone(), &ic);
    let mut pde = VortexPair {
        stepper: FdStepper::new(&ops, nu, dt)?,
        field,
        step: 0,
        time: 0.,
    };
    pde.callback()?;
    integrate(&mut pde, 2.0, Some(40))?;
    Ok(())
}
