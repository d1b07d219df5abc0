//! Perspective-n-Point pose estimation for a generic face model
//!
//! Solves for the rotation and translation that map six 3D face model points
//! onto their observed 2D image positions, using Levenberg-Marquardt over a
//! rotation vector + translation parameterisation with zero lens distortion.
//!
//! Coordinates are camera-convention throughout: x right, y down, z away
//! from the camera. A face looking straight at the camera has identity
//! rotation.

use thiserror::Error;

pub type Vec3 = [f64; 3];
pub type Mat3 = [[f64; 3]; 3];

/// Generic face model (arbitrary but consistent units), in the order
/// nose tip, chin, image-left eye outer corner, image-right eye outer corner,
/// image-left mouth corner, image-right mouth corner.
pub const FACE_MODEL: [Vec3; 6] = [
    [0.0, 0.0, 0.0],
    [0.0, 330.0, 65.0],
    [-225.0, -170.0, 135.0],
    [225.0, -170.0, 135.0],
    [-150.0, 150.0, 125.0],
    [150.0, 150.0, 125.0],
];

/// Distance between the two eye corners of [`FACE_MODEL`]
const MODEL_EYE_SPAN: f64 = 450.0;

const MAX_ITERATIONS: usize = 100;

/// Why a pose could not be estimated
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PnpError {
    #[error("expected {expected} correspondences, got {actual}")]
    Correspondences { expected: usize, actual: usize },

    #[error("degenerate input: {0}")]
    Degenerate(&'static str),

    #[error("solver diverged")]
    Diverged,
}

/// Pinhole camera with no distortion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Approximation used for uncalibrated webcams: focal length equals the
    /// image width, principal point at the image center.
    pub fn approximate(width: f64, height: f64) -> Self {
        Self {
            focal: width,
            cx: width / 2.0,
            cy: height / 2.0,
        }
    }

    fn project(&self, p: Vec3) -> Option<[f64; 2]> {
        if p[2] <= 1e-9 {
            return None;
        }
        Some([
            self.focal * p[0] / p[2] + self.cx,
            self.focal * p[1] / p[2] + self.cy,
        ])
    }
}

/// Rigid transform from model to camera coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl Pose {
    pub fn new(rotation: Mat3, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    fn apply(&self, p: Vec3) -> Vec3 {
        let r = &self.rotation;
        [
            r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + self.translation[0],
            r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + self.translation[1],
            r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + self.translation[2],
        ]
    }

    /// (pitch, yaw, roll) in degrees for `R = Rz(roll) · Ry(yaw) · Rx(pitch)`.
    ///
    /// Positive pitch tilts the face down, positive yaw turns it toward the
    /// image's left (the subject's right).
    pub fn euler_degrees(&self) -> (f64, f64, f64) {
        let r = &self.rotation;
        let pitch = r[2][1].atan2(r[2][2]);
        let yaw = (-r[2][0]).atan2((r[2][1] * r[2][1] + r[2][2] * r[2][2]).sqrt());
        let roll = r[1][0].atan2(r[0][0]);
        (pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
    }
}

/// Rotation matrix from a rotation vector (axis * angle)
pub fn rodrigues(v: Vec3) -> Mat3 {
    let theta = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if theta < 1e-12 {
        return [
            [1.0, -v[2], v[1]],
            [v[2], 1.0, -v[0]],
            [-v[1], v[0], 1.0],
        ];
    }
    let k = [v[0] / theta, v[1] / theta, v[2] / theta];
    let (s, c) = theta.sin_cos();
    let t = 1.0 - c;
    [
        [
            c + k[0] * k[0] * t,
            k[0] * k[1] * t - k[2] * s,
            k[0] * k[2] * t + k[1] * s,
        ],
        [
            k[1] * k[0] * t + k[2] * s,
            c + k[1] * k[1] * t,
            k[1] * k[2] * t - k[0] * s,
        ],
        [
            k[2] * k[0] * t - k[1] * s,
            k[2] * k[1] * t + k[0] * s,
            c + k[2] * k[2] * t,
        ],
    ]
}

/// Project model points through a pose onto the image plane
pub fn project_points(
    model: &[Vec3],
    pose: &Pose,
    camera: &CameraIntrinsics,
) -> Option<Vec<[f64; 2]>> {
    model.iter().map(|p| camera.project(pose.apply(*p))).collect()
}

fn pose_from_params(p: &[f64; 6]) -> Pose {
    Pose::new(rodrigues([p[0], p[1], p[2]]), [p[3], p[4], p[5]])
}

/// Residual vector (projected - observed); `None` if a point falls behind the camera
fn residuals(
    params: &[f64; 6],
    model: &[Vec3],
    image: &[[f64; 2]],
    camera: &CameraIntrinsics,
) -> Option<Vec<f64>> {
    let pose = pose_from_params(params);
    let mut out = Vec::with_capacity(image.len() * 2);
    for (m, obs) in model.iter().zip(image) {
        let proj = camera.project(pose.apply(*m))?;
        out.push(proj[0] - obs[0]);
        out.push(proj[1] - obs[1]);
    }
    Some(out)
}

fn cost(r: &[f64]) -> f64 {
    r.iter().map(|x| x * x).sum()
}

/// Solve `a x = b` for a 6x6 system with partial pivoting
fn solve6(mut a: [[f64; 6]; 6], mut b: [f64; 6]) -> Option<[f64; 6]> {
    for col in 0..6 {
        let pivot = (col..6).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-15 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..6 {
            let factor = a[row][col] / a[col][col];
            for k in col..6 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0; 6];
    for row in (0..6).rev() {
        let tail: f64 = ((row + 1)..6).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Estimate the pose of [`FACE_MODEL`]-style points from their projections.
pub fn solve_pnp(
    model: &[Vec3],
    image: &[[f64; 2]],
    camera: &CameraIntrinsics,
) -> Result<Pose, PnpError> {
    if model.len() != FACE_MODEL.len() || image.len() != model.len() {
        return Err(PnpError::Correspondences {
            expected: FACE_MODEL.len(),
            actual: image.len().min(model.len()),
        });
    }
    if image.iter().flatten().any(|v| !v.is_finite()) {
        return Err(PnpError::Degenerate("non-finite image point"));
    }

    // Initial guess: frontal face, depth from the apparent eye span
    let eye_span = ((image[3][0] - image[2][0]).powi(2) + (image[3][1] - image[2][1]).powi(2)).sqrt();
    if eye_span < 1.0 {
        return Err(PnpError::Degenerate("eye corners coincide"));
    }
    let tz = camera.focal * MODEL_EYE_SPAN / eye_span;
    let mut params = [
        0.0,
        0.0,
        0.0,
        (image[0][0] - camera.cx) * tz / camera.focal,
        (image[0][1] - camera.cy) * tz / camera.focal,
        tz,
    ];

    let mut r = residuals(&params, model, image, camera).ok_or(PnpError::Diverged)?;
    let mut current = cost(&r);
    let mut lambda = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        // Numerical Jacobian, central differences
        let mut jac = vec![[0.0; 6]; r.len()];
        for j in 0..6 {
            let h = 1e-6 * params[j].abs().max(1.0);
            let mut plus = params;
            let mut minus = params;
            plus[j] += h;
            minus[j] -= h;
            let rp = residuals(&plus, model, image, camera).ok_or(PnpError::Diverged)?;
            let rm = residuals(&minus, model, image, camera).ok_or(PnpError::Diverged)?;
            for (row, (p, m)) in rp.iter().zip(&rm).enumerate() {
                jac[row][j] = (p - m) / (2.0 * h);
            }
        }

        let mut jtj = [[0.0; 6]; 6];
        let mut jtr = [0.0; 6];
        for (row, res) in jac.iter().zip(&r) {
            for a in 0..6 {
                jtr[a] += row[a] * res;
                for b in 0..6 {
                    jtj[a][b] += row[a] * row[b];
                }
            }
        }

        let mut improved = false;
        while lambda < 1e12 {
            let mut damped = jtj;
            for (d, row) in damped.iter_mut().enumerate() {
                row[d] += lambda * jtj[d][d].max(1e-12);
            }
            let rhs = jtr.map(|v| -v);
            let Some(delta) = solve6(damped, rhs) else {
                lambda *= 10.0;
                continue;
            };

            let mut candidate = params;
            for (p, d) in candidate.iter_mut().zip(delta) {
                *p += d;
            }
            match residuals(&candidate, model, image, camera) {
                Some(next) if cost(&next) < current => {
                    let step: f64 = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
                    params = candidate;
                    r = next;
                    let previous = current;
                    current = cost(&r);
                    lambda = (lambda / 10.0).max(1e-12);
                    improved = true;
                    if step < 1e-10 || previous - current < 1e-12 * previous.max(1.0) {
                        return finish(params);
                    }
                    break;
                }
                _ => lambda *= 10.0,
            }
        }

        if !improved {
            // No step reduces the error: converged (or stuck) at this point
            break;
        }
    }

    finish(params)
}

fn finish(params: [f64; 6]) -> Result<Pose, PnpError> {
    if params.iter().all(|p| p.is_finite()) && params[5] > 0.0 {
        Ok(pose_from_params(&params))
    } else {
        Err(PnpError::Diverged)
    }
}
