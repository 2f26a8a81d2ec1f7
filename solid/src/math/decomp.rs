//! Rotation-variant SVD, polar decomposition, and the rotationally covariant
//! eigenbases shared by every material eigensystem.

use super::{flatten, Mat3, Mat9, Real, Vec3};

/// Rotation variant of the SVD where reflections are loaded into Sigma and
/// not U and V, so that U and V are pure rotations.
///
/// Post-conditions: det U = det V = +1, Σ₀, Σ₁ ≥ 0, and sign(Σ₂) = sign(det F).
pub fn svd_rv(f: &Mat3) -> (Mat3, Vec3, Mat3) {
    let svd = f.svd(true, true);
    let mut u = svd.u.expect("SVD requested U");
    let mut v = svd.v_t.expect("SVD requested V").transpose();
    let mut sigma = Vec3::new(
        svd.singular_values[0],
        svd.singular_values[1],
        svd.singular_values[2],
    );

    let mut l = Mat3::identity();
    l[(2, 2)] = (u * v.transpose()).determinant();

    let det_u = u.determinant();
    let det_v = v.determinant();

    if det_u < 0.0 && det_v > 0.0 {
        u *= l;
    }
    if det_u > 0.0 && det_v < 0.0 {
        v *= l;
    }

    sigma[2] *= l[(2, 2)];
    (u, sigma, v)
}

/// Polar decomposition A = R S with R = U Vᵀ and S = V diag(Σ) Vᵀ.
pub fn polar_decomposition(a: &Mat3) -> (Mat3, Mat3) {
    let (u, sigma, v) = svd_rv(a);
    let r = u * v.transpose();
    let s = v * Mat3::from_diagonal(&sigma) * v.transpose();
    (r, s)
}

// The three skew "twist" generators, T₀ = x-twist, T₁ = y-twist, T₂ = z-twist.
fn twist(i: usize) -> Mat3 {
    match i {
        0 => Mat3::new(0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0),
        1 => Mat3::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0),
        _ => Mat3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
    }
}

// The three symmetric "flip" generators.
fn flip(i: usize) -> Mat3 {
    match i {
        0 => Mat3::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0),
        1 => Mat3::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
        _ => Mat3::new(0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
    }
}

/// Rotation gradient ∂R/∂F with eigenvalues λᵢ = 2/(σⱼ + σₖ), cyclic.
pub fn rotation_gradient(u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat9 {
    let front = 1.0 / (2.0 as Real).sqrt();
    let qx = flatten(&(front * u * twist(0) * v.transpose()));
    let qy = flatten(&(front * u * twist(1) * v.transpose()));
    let qz = flatten(&(front * u * twist(2) * v.transpose()));

    let lambda_x = 2.0 / (sigma[1] + sigma[2]);
    let lambda_y = 2.0 / (sigma[0] + sigma[2]);
    let lambda_z = 2.0 / (sigma[0] + sigma[1]);

    lambda_x * (qx * qx.transpose())
        + lambda_y * (qy * qy.transpose())
        + lambda_z * (qz * qz.transpose())
}

/// Time derivative of the rotation, Ṙ = (∂R/∂F) : Ḟ.
pub fn rotation_dot(u: &Mat3, sigma: &Vec3, v: &Mat3, fdot: &Mat3) -> Mat3 {
    let drdf = rotation_gradient(u, sigma, v);
    super::unflatten(&(drdf * flatten(fdot)))
}

/// Fill columns 0–2 (twist modes) and 3–5 (flip modes) of the 9×9 eigenmatrix
/// with the flattened, world-rotated basis matrices (1/√2) U Bᵢ Vᵀ.
pub fn twist_and_flip_eigenvectors(u: &Mat3, v: &Mat3, q9: &mut Mat9) {
    let front = 1.0 / (2.0 as Real).sqrt();
    for i in 0..3 {
        q9.set_column(i, &flatten(&(front * u * twist(i) * v.transpose())));
        q9.set_column(3 + i, &flatten(&(front * u * flip(i) * v.transpose())));
    }
}

/// Fill columns 6–8 (scaling modes) with U eᵢ Vᵀ, the jackpot version.
pub fn scaling_eigenvectors(u: &Mat3, v: &Mat3, q9: &mut Mat9) {
    for i in 0..3 {
        let mut e = Vec3::zeros();
        e[i] = 1.0;
        q9.set_column(6 + i, &flatten(&(u * Mat3::from_diagonal(&e) * v.transpose())));
    }
}

/// Fill columns 6–8 (scaling modes) with U diag(qᵢ) Vᵀ, where the qᵢ are the
/// columns of the 3×3 eigenvector matrix of a material scaling block.
pub fn scaling_eigenvectors_from(u: &Mat3, q3: &Mat3, v: &Mat3, q9: &mut Mat9) {
    for i in 0..3 {
        let q: Vec3 = q3.column(i).into();
        q9.set_column(6 + i, &flatten(&(u * Mat3::from_diagonal(&q) * v.transpose())));
    }
}

/// ∂J/∂F, the matrix of column cross products of F
/// (Eqn. 19 of "Stable Neo-Hookean Flesh Simulation").
pub fn partial_j_partial_f(f: &Mat3) -> Mat3 {
    let f0: Vec3 = f.column(0).into();
    let f1: Vec3 = f.column(1).into();
    let f2: Vec3 = f.column(2).into();

    let mut pjpf = Mat3::zeros();
    pjpf.set_column(0, &f1.cross(&f2));
    pjpf.set_column(1, &f2.cross(&f0));
    pjpf.set_column(2, &f0.cross(&f1));
    pjpf
}

/// Skew-symmetric cross-product matrix of column `col` of F
/// (Eqn. 29 of the same reference).
pub fn cross_product_matrix(f: &Mat3, col: usize) -> Mat3 {
    Mat3::new(
        0.0,
        -f[(2, col)],
        f[(1, col)],
        f[(2, col)],
        0.0,
        -f[(0, col)],
        -f[(1, col)],
        f[(0, col)],
        0.0,
    )
}

/// The "fractal cross product" Hessian of J: a 9×9 block matrix whose
/// off-diagonal 3×3 blocks are the skew matrices [Fᵢ]×, signed so that
/// ∂²J/∂F² = j_hessian(F).
pub fn j_hessian(f: &Mat3) -> Mat9 {
    let f0_hat = cross_product_matrix(f, 0);
    let f1_hat = cross_product_matrix(f, 1);
    let f2_hat = cross_product_matrix(f, 2);

    let mut hess = Mat9::zeros();
    for j in 0..3 {
        for i in 0..3 {
            hess[(i, j + 3)] = -f2_hat[(i, j)];
            hess[(i + 3, j)] = f2_hat[(i, j)];

            hess[(i, j + 6)] = f1_hat[(i, j)];
            hess[(i + 6, j)] = -f1_hat[(i, j)];

            hess[(i + 3, j + 6)] = -f0_hat[(i, j)];
            hess[(i + 6, j + 3)] = f0_hat[(i, j)];
        }
    }
    hess
}

/// Third-order tensor derivative of F with respect to itself: the (i, j)
/// slice is the single-entry matrix eᵢeⱼᵀ.
pub fn partial_f_partial_f(i: usize, j: usize) -> Mat3 {
    let mut pfpf = Mat3::zeros();
    pfpf[(i, j)] = 1.0;
    pfpf
}
