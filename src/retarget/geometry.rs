use nalgebra::{UnitQuaternion, Vector3};

/// これ以下の長さのベクトルは方向を持たないものとして扱う
pub const MIN_LENGTH: f32 = 1e-6;

/// 主軸と補助軸のなす角の正弦がこれ以下なら平行とみなす
const PARALLEL_SIN: f32 = 1e-4;

pub fn world_up() -> Vector3<f32> {
    Vector3::y()
}

pub fn midpoint(a: &Vector3<f32>, b: &Vector3<f32>) -> Vector3<f32> {
    (a + b) * 0.5
}

/// 正規化。ゼロ長なら None
pub fn direction(v: &Vector3<f32>) -> Option<Vector3<f32>> {
    if !v.iter().all(|c| c.is_finite()) {
        return None;
    }
    v.try_normalize(MIN_LENGTH)
}

/// +Z を `forward`、+Y を `up` 側へ向ける回転
///
/// `forward` がゼロ長、または `up` と平行・反平行のときは定義できないため None。
pub fn look_rotation(forward: &Vector3<f32>, up: &Vector3<f32>) -> Option<UnitQuaternion<f32>> {
    let f = direction(forward)?;
    let u = direction(up)?;
    if f.cross(&u).norm() <= PARALLEL_SIN {
        return None;
    }
    let q = UnitQuaternion::face_towards(&f, &u);
    if is_finite(&q) {
        Some(q)
    } else {
        None
    }
}

/// `axis` 周りで `from` から `to` への符号付き角度（ラジアン）
pub fn signed_angle(from: &Vector3<f32>, to: &Vector3<f32>, axis: &Vector3<f32>) -> f32 {
    let cross = from.cross(to);
    let angle = cross.norm().atan2(from.dot(to));
    if axis.dot(&cross) < 0.0 {
        -angle
    } else {
        angle
    }
}

pub fn is_finite(q: &UnitQuaternion<f32>) -> bool {
    q.coords.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_vec(a: &Vector3<f32>, b: &Vector3<f32>, eps: f32) -> bool {
        (a - b).norm() < eps
    }

    #[test]
    fn test_look_rotation_forward_axis() {
        let forward = Vector3::new(1.0, 0.0, 1.0);
        let q = look_rotation(&forward, &world_up()).unwrap();
        let z = q * Vector3::z();
        assert!(approx_eq_vec(&z, &forward.normalize(), 1e-5));
        // up は forward に直交化されたまま上を向く
        let y = q * Vector3::y();
        assert!(approx_eq_vec(&y, &Vector3::y(), 1e-5));
    }

    #[test]
    fn test_look_rotation_identity() {
        let q = look_rotation(&Vector3::z(), &Vector3::y()).unwrap();
        assert!(q.angle() < 1e-5);
    }

    #[test]
    fn test_look_rotation_degenerate() {
        assert!(look_rotation(&Vector3::zeros(), &world_up()).is_none());
        assert!(look_rotation(&Vector3::x(), &Vector3::zeros()).is_none());
        assert!(look_rotation(&Vector3::y(), &world_up()).is_none());
        assert!(look_rotation(&-Vector3::y(), &world_up()).is_none());
        assert!(look_rotation(&Vector3::new(f32::NAN, 0.0, 1.0), &world_up()).is_none());
    }

    #[test]
    fn test_signed_angle_sign() {
        let up = world_up();
        let forward_lean = Vector3::new(0.0, 1.0, 1.0);
        let a = signed_angle(&up, &forward_lean, &Vector3::x());
        assert!((a - std::f32::consts::FRAC_PI_4).abs() < 1e-5);
        let b = signed_angle(&up, &forward_lean, &-Vector3::x());
        assert!((b + std::f32::consts::FRAC_PI_4).abs() < 1e-5);
    }

    #[test]
    fn test_signed_angle_zero_vectors() {
        assert_eq!(signed_angle(&Vector3::zeros(), &Vector3::y(), &Vector3::x()), 0.0);
    }

    #[test]
    fn test_midpoint() {
        let m = midpoint(&Vector3::new(0.0, 2.0, 4.0), &Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(m, Vector3::new(1.0, 1.0, 2.0));
    }
}
