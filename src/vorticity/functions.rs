//! Some useful post-processing functions
use ndarray::{ArrayBase, Data, Ix2};

/// Return l2 norm of real array
pub fn norm_l2_f64<S: Data<Elem = f64>>(array: &ArrayBase<S, Ix2>) -> f64 {
    array.iter().map(|x| x.powi(2)).sum::<f64>().sqrt()
}

/// Return l2 norm of the difference of two arrays
///
/// # Panics
/// Shape mismatch.
pub fn norm_l2_diff<S1, S2>(a: &ArrayBase<S1, Ix2>, b: &ArrayBase<S2, Ix2>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    assert!(a.dim() == b.dim(), "norm_l2_diff: shape mismatch");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Cfl number max(|u| dt / dx + |v| dt / dy) of a streamfunction,
/// velocities from central differences
pub fn cfl<S: Data<Elem = f64>>(psi: &ArrayBase<S, Ix2>, dx: f64, dy: f64, dt: f64) -> f64 {
    let (nx, ny) = psi.dim();
    let mut cfl = 0_f64;
    for i in 0..nx {
        for j in 0..ny {
            let (ip, im) = ((i + 1) % nx, (i + nx - 1) % nx);
            let (jp, jm) = ((j + 1) % ny, (j + ny - 1) % ny);
            let u = (psi[[i, jp]] - psi[[i, jm]]) / (2. * dy);
            let v = -(psi[[ip, j]] - psi[[im, j]]) / (2. * dx);
            cfl = cfl.max(u.abs() * dt / dx + v.abs() * dt / dy);
        }
    }
    cfl
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_norms() {
        let a = array![[3., 0.], [0., 4.]];
        let b = array![[0., 0.], [0., 4.]];
        assert_eq!(norm_l2_f64(&a), 5.);
        assert_eq!(norm_l2_diff(&a, &b), 3.);
    }

    #[test]
    fn test_cfl_shear_flow() {
        // psi = [0, 1, 0, -1] along y, max |u| = 1
        let psi = ndarray::Array2::from_shape_fn((4, 4), |(_, j)| [0., 1., 0., -1.][j]);
        let c = cfl(&psi, 1., 1., 0.1);
        assert!((c - 0.1).abs() < 1e-12);
    }
}
