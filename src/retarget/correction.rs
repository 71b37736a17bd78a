use std::collections::BTreeMap;

use nalgebra::{UnitQuaternion, Vector3};

use super::estimators::{standard_estimators, BoneEstimator, EstimatorInput, Skip};
use super::rest_pose::t_pose;
use crate::rig::Bone;

/// オイラー角（度, Unity と同じ Z→X→Y 順）からクォータニオンを作る
pub fn euler_degrees(x: f32, y: f32, z: f32) -> UnitQuaternion<f32> {
    let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), x.to_radians());
    let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), y.to_radians());
    let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), z.to_radians());
    ry * rx * rz
}

/// ボーンごとのレストポーズ補正
///
/// 推定した回転の右側に掛ける。対象スケルトンのバインドポーズとの差を吸収する
/// ためのデータで、スケルトンを替えるときは設定ファイルで上書きする。
#[derive(Debug, Clone, PartialEq)]
pub struct RestPoseCorrections {
    table: BTreeMap<Bone, UnitQuaternion<f32>>,
}

impl RestPoseCorrections {
    /// 全ボーン補正なし
    pub fn identity() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// 基準姿勢のフレームで各ボーンが単位回転になるような補正を求める
    ///
    /// 推定できなかったボーンは補正なしのまま、理由と一緒に返す。
    pub fn calibrate(
        estimators: &[BoneEstimator],
        input: &EstimatorInput<'_>,
    ) -> (Self, Vec<(Bone, Skip)>) {
        let mut corrections = Self::identity();
        let mut skipped = Vec::new();
        for e in estimators {
            // キャリブレーションは可視性を問わない
            match e.estimate(input, 0.0, false) {
                Ok(raw) => corrections.set(e.bone, raw.inverse()),
                Err(skip) => skipped.push((e.bone, skip)),
            }
        }
        (corrections, skipped)
    }

    /// Tポーズで単位回転になるヒューマノイド向け既定値
    pub fn for_t_pose(flip_y: bool) -> Self {
        let landmarks = t_pose();
        let input = EstimatorInput::new(&landmarks, flip_y, 0.0);
        let (corrections, skipped) = Self::calibrate(&standard_estimators(), &input);
        for (bone, skip) in skipped {
            log::warn!("No rest-pose correction for {}: {}", bone.name(), skip);
        }
        corrections
    }

    /// 設定ファイルの `[retarget.corrections]` を重ねる。未知のボーン名は無視
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, [f32; 3]>) -> Self {
        for (name, [x, y, z]) in overrides {
            match Bone::from_name(name) {
                Some(bone) => self.set(bone, euler_degrees(*x, *y, *z)),
                None => log::warn!("Ignoring correction for unknown bone {:?}", name),
            }
        }
        self
    }

    pub fn get(&self, bone: Bone) -> UnitQuaternion<f32> {
        self.table
            .get(&bone)
            .copied()
            .unwrap_or_else(UnitQuaternion::identity)
    }

    pub fn set(&mut self, bone: Bone, rotation: UnitQuaternion<f32>) {
        self.table.insert(bone, rotation);
    }
}

impl Default for RestPoseCorrections {
    fn default() -> Self {
        Self::for_t_pose(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::LandmarkSet;

    #[test]
    fn test_euler_single_axis() {
        let q = euler_degrees(0.0, 90.0, 0.0);
        let v = q * Vector3::z();
        assert!((v - Vector3::x()).norm() < 1e-5);
    }

    #[test]
    fn test_euler_order_matches_unity() {
        // Z → X → Y の順に回す
        let q = euler_degrees(90.0, 90.0, 0.0);
        let v = q * Vector3::y();
        // Rx(90): y → z, 続いて Ry(90): z → x
        assert!((v - Vector3::x()).norm() < 1e-5);
    }

    #[test]
    fn test_t_pose_maps_to_identity() {
        let corrections = RestPoseCorrections::for_t_pose(true);
        let landmarks = t_pose();
        let input = EstimatorInput::new(&landmarks, true, 4.0);
        for e in standard_estimators() {
            let raw = e.estimate(&input, 0.5, false).unwrap();
            let corrected = raw * corrections.get(e.bone);
            assert!(corrected.angle() < 1e-4, "{:?}", e.bone);
        }
        // 頭は基準姿勢で既に正面
        assert!(corrections.get(Bone::Head).angle() < 1e-4);
        assert!(corrections.get(Bone::LeftUpperArm).angle() > 1.0);
    }

    #[test]
    fn test_calibrate_reports_skips() {
        let landmarks = LandmarkSet::new(t_pose().landmarks[..12].to_vec());
        let input = EstimatorInput::new(&landmarks, true, 4.0);
        let (corrections, skipped) =
            RestPoseCorrections::calibrate(&standard_estimators(), &input);
        // 頭だけ推定できる
        assert_eq!(skipped.len(), Bone::COUNT - 1);
        assert!(skipped.iter().all(|(b, _)| *b != Bone::Head));
        assert_eq!(corrections.get(Bone::Hips), UnitQuaternion::identity());
    }

    #[test]
    fn test_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("Head".to_string(), [0.0, 180.0, 0.0]);
        overrides.insert("Tail".to_string(), [1.0, 2.0, 3.0]);
        let c = RestPoseCorrections::default().with_overrides(&overrides);
        assert!((c.get(Bone::Head).angle() - std::f32::consts::PI).abs() < 1e-4);
        assert_eq!(c.get(Bone::Chest), RestPoseCorrections::default().get(Bone::Chest));
    }
}
