//! Arakawa (1966) discretization of the jacobian
//! ..math:
//!  J(a, b) = da/dx db/dy - da/dy db/dx
//!
//! on a doubly periodic grid. The average of the three second order
//! forms J++, J+x and Jx+ conserves the discrete integrals of `a * b`,
//! `a^2` and `b^2`, which for the vorticity equation means kinetic energy
//! and enstrophy are not produced by the advection term.
use ndarray::{Array2, ArrayBase, Data, Ix2, Zip};

/// Arakawa jacobian J(a, b). Both arrays must have the same shape.
///
/// The advection term of the vorticity equation is
/// `u . grad(omega) = arakawa(omega, psi, dx, dy)` for `u = dpsi/dy`,
/// `v = -dpsi/dx`.
///
/// # Panics
/// Shape mismatch.
pub fn arakawa<S1, S2>(a: &ArrayBase<S1, Ix2>, b: &ArrayBase<S2, Ix2>, dx: f64, dy: f64) -> Array2<f64>
where
    S1: Data<Elem = f64> + Sync,
    S2: Data<Elem = f64> + Sync,
{
    assert!(a.dim() == b.dim(), "arakawa: shape mismatch");
    let (nx, ny) = a.dim();
    let c = 1. / (12. * dx * dy);
    let mut out = Array2::zeros((nx, ny));
    Zip::indexed(&mut out).par_for_each(|(i, j), o| {
        let (ip, im) = ((i + 1) % nx, (i + nx - 1) % nx);
        let (jp, jm) = ((j + 1) % ny, (j + ny - 1) % ny);
        let jpp = (a[[ip, j]] - a[[im, j]]) * (b[[i, jp]] - b[[i, jm]])
            - (a[[i, jp]] - a[[i, jm]]) * (b[[ip, j]] - b[[im, j]]);
        let jpx = a[[ip, j]] * (b[[ip, jp]] - b[[ip, jm]])
            - a[[im, j]] * (b[[im, jp]] - b[[im, jm]])
            - a[[i, jp]] * (b[[ip, jp]] - b[[im, jp]])
            + a[[i, jm]] * (b[[ip, jm]] - b[[im, jm]]);
        let jxp = b[[i, jp]] * (a[[ip, jp]] - a[[im, jp]])
            - b[[i, jm]] * (a[[ip, jm]] - a[[im, jm]])
            - b[[ip, j]] * (a[[ip, jp]] - a[[ip, jm]])
            + b[[im, j]] * (a[[im, jp]] - a[[im, jm]]);
        *o = (jpp + jpx + jxp) * c;
    });
    out
}
