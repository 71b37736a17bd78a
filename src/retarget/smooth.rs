use nalgebra::{UnitQuaternion, Vector3};

/// slerp が定義できないとみなす角度の閾値
const SLERP_EPSILON: f32 = 1e-6;

/// 経過時間とレートから補間係数 (0.0..=1.0) を求める
///
/// rate=10, dt=1/60 なら 1ティックで残り角度の約 1/6 を詰める。
pub fn blend_factor(rate: f32, dt: f32) -> f32 {
    let t = rate * dt;
    if t.is_finite() {
        t.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// 現在の回転から目標へ t だけ寄せる（最短経路の slerp）
pub fn blend_rotation(
    current: &UnitQuaternion<f32>,
    target: &UnitQuaternion<f32>,
    t: f32,
) -> UnitQuaternion<f32> {
    // try_slerp は符号反転で最短経路を取る。None はほぼ同一の回転
    current
        .try_slerp(target, t, SLERP_EPSILON)
        .unwrap_or(*target)
}

pub fn blend_position(current: &Vector3<f32>, target: &Vector3<f32>, t: f32) -> Vector3<f32> {
    current.lerp(target, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaw(angle: f32) -> UnitQuaternion<f32> {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle)
    }

    #[test]
    fn test_blend_factor_clamped() {
        assert_eq!(blend_factor(10.0, 0.05), 0.5);
        assert_eq!(blend_factor(10.0, 1.0), 1.0);
        assert_eq!(blend_factor(10.0, -0.1), 0.0);
        assert_eq!(blend_factor(10.0, f32::NAN), 0.0);
    }

    #[test]
    fn test_no_smoothing() {
        let target = yaw(1.0);
        let result = blend_rotation(&UnitQuaternion::identity(), &target, 1.0);
        assert!(result.angle_to(&target) < 1e-5);
    }

    #[test]
    fn test_full_smoothing() {
        let current = yaw(0.3);
        let result = blend_rotation(&current, &yaw(1.0), 0.0);
        assert!(result.angle_to(&current) < 1e-5);
    }

    #[test]
    fn test_rotation_halfway() {
        let result = blend_rotation(&UnitQuaternion::identity(), &yaw(1.0), 0.5);
        assert!((result.angle() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_rotation_shortest_path() {
        // 符号反転した同じ回転を目標にしても遠回りしない
        let current = yaw(0.2);
        let flipped = UnitQuaternion::new_unchecked(-yaw(0.4).into_inner());
        let result = blend_rotation(&current, &flipped, 0.5);
        assert!((result.angle() - 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_identical_rotation() {
        let q = yaw(0.7);
        let result = blend_rotation(&q, &q, 0.3);
        assert!(result.angle_to(&q) < 1e-5);
    }

    #[test]
    fn test_rotation_stays_normalized() {
        let a = UnitQuaternion::from_euler_angles(0.3, -1.2, 2.0);
        let b = UnitQuaternion::from_euler_angles(-2.5, 0.4, 0.1);
        for &t in &[0.0, 0.25, 0.5, 0.75, 1.0] {
            let r = blend_rotation(&a, &b, t);
            assert!((r.coords.norm() - 1.0).abs() < 1e-5, "t={}", t);
        }
    }

    #[test]
    fn test_converges_monotonically() {
        let target = UnitQuaternion::from_euler_angles(0.4, 1.3, -0.2);
        let mut current = UnitQuaternion::identity();
        let t = blend_factor(10.0, 1.0 / 60.0);

        let mut prev = current.angle_to(&target);
        let mut ticks = 0;
        while prev > 1e-2 {
            current = blend_rotation(&current, &target, t);
            let angle = current.angle_to(&target);
            assert!(angle < prev, "tick {}: {} !< {}", ticks, angle, prev);
            prev = angle;
            ticks += 1;
            assert!(ticks < 100, "did not converge");
        }
    }

    #[test]
    fn test_position_smoothing() {
        let result = blend_position(&Vector3::zeros(), &Vector3::new(2.0, 4.0, 6.0), 0.5);
        assert_eq!(result, Vector3::new(1.0, 2.0, 3.0));
    }
}
