//! ボーンごとの回転推定
//!
//! 各推定器は必要なランドマークと計算関数の組で、表として並べて順に評価する。
//! 計算結果は補正前の「生」回転で、レストポーズ補正はエンジン側で掛ける。

use nalgebra::{Unit, UnitQuaternion, Vector3};
use thiserror::Error;

use super::geometry::{
    direction, is_finite, look_rotation, midpoint, signed_angle, world_up, MIN_LENGTH,
};
use crate::landmark::{LandmarkSet, PoseIndex};
use crate::rig::Bone;

/// ボーンを更新しなかった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Skip {
    #[error("needs {required} landmarks, got {available}")]
    InsufficientLandmarks { required: usize, available: usize },
    #[error("landmark {index} below visibility threshold")]
    LowConfidence { index: usize },
    #[error("degenerate geometry")]
    DegenerateGeometry,
}

/// 推定関数に渡す入力
pub struct EstimatorInput<'a> {
    pub landmarks: &'a LandmarkSet,
    /// 画像座標の Y を反転して Y上向きにする
    pub flip_y: bool,
    pub head_pitch_gain: f32,
}

impl<'a> EstimatorInput<'a> {
    pub fn new(landmarks: &'a LandmarkSet, flip_y: bool, head_pitch_gain: f32) -> Self {
        Self {
            landmarks,
            flip_y,
            head_pitch_gain,
        }
    }

    /// Y上向きの空間でのランドマーク位置
    pub fn point(&self, index: usize) -> Result<Vector3<f32>, Skip> {
        let lm = self
            .landmarks
            .get(index)
            .ok_or(Skip::InsufficientLandmarks {
                required: index + 1,
                available: self.landmarks.len(),
            })?;
        if !lm.is_finite() {
            return Err(Skip::DegenerateGeometry);
        }
        let mut p = lm.position();
        if self.flip_y {
            p.y = -p.y;
        }
        Ok(p)
    }
}

pub type ComputeFn = fn(&EstimatorInput<'_>) -> Result<UnitQuaternion<f32>, Skip>;

/// 1ボーン分の推定器
pub struct BoneEstimator {
    pub bone: Bone,
    pub required: &'static [usize],
    /// 可視性ゲートを常にかけるか
    pub visibility_gated: bool,
    pub compute: ComputeFn,
}

impl BoneEstimator {
    /// 必要なランドマーク数（最大インデックス + 1）
    pub fn min_landmarks(&self) -> usize {
        self.required.iter().max().map_or(0, |&i| i + 1)
    }

    /// 件数・可視性を確認してから回転を計算する
    pub fn estimate(
        &self,
        input: &EstimatorInput<'_>,
        visibility_threshold: f32,
        gate_all: bool,
    ) -> Result<UnitQuaternion<f32>, Skip> {
        if !input.landmarks.has_all(self.required) {
            return Err(Skip::InsufficientLandmarks {
                required: self.min_landmarks(),
                available: input.landmarks.len(),
            });
        }

        if self.visibility_gated || gate_all {
            for &index in self.required {
                let visible = input
                    .landmarks
                    .get(index)
                    .is_some_and(|lm| lm.is_visible(visibility_threshold));
                if !visible {
                    return Err(Skip::LowConfidence { index });
                }
            }
        }

        let q = (self.compute)(input)?;
        if is_finite(&q) {
            Ok(q)
        } else {
            Err(Skip::DegenerateGeometry)
        }
    }
}

const NOSE: usize = PoseIndex::Nose.index();
const L_EAR: usize = PoseIndex::LeftEar.index();
const R_EAR: usize = PoseIndex::RightEar.index();
const L_SHOULDER: usize = PoseIndex::LeftShoulder.index();
const R_SHOULDER: usize = PoseIndex::RightShoulder.index();
const L_ELBOW: usize = PoseIndex::LeftElbow.index();
const R_ELBOW: usize = PoseIndex::RightElbow.index();
const L_WRIST: usize = PoseIndex::LeftWrist.index();
const R_WRIST: usize = PoseIndex::RightWrist.index();
const L_INDEX: usize = PoseIndex::LeftIndex.index();
const R_INDEX: usize = PoseIndex::RightIndex.index();
const L_HIP: usize = PoseIndex::LeftHip.index();
const R_HIP: usize = PoseIndex::RightHip.index();
const L_KNEE: usize = PoseIndex::LeftKnee.index();
const R_KNEE: usize = PoseIndex::RightKnee.index();
const L_ANKLE: usize = PoseIndex::LeftAnkle.index();
const R_ANKLE: usize = PoseIndex::RightAnkle.index();

/// 評価順に並べた全推定器
pub fn standard_estimators() -> Vec<BoneEstimator> {
    vec![
        BoneEstimator {
            bone: Bone::Hips,
            required: &[L_HIP, R_HIP],
            visibility_gated: false,
            compute: hips,
        },
        BoneEstimator {
            bone: Bone::Spine,
            required: &[L_SHOULDER, R_SHOULDER, L_HIP, R_HIP],
            visibility_gated: false,
            compute: waist,
        },
        BoneEstimator {
            bone: Bone::Chest,
            required: &[L_SHOULDER, R_SHOULDER],
            visibility_gated: false,
            compute: chest,
        },
        BoneEstimator {
            bone: Bone::Head,
            required: &[NOSE, L_EAR, R_EAR],
            visibility_gated: false,
            compute: head,
        },
        BoneEstimator {
            bone: Bone::LeftUpperArm,
            required: &[L_SHOULDER, L_ELBOW],
            visibility_gated: false,
            compute: limb::<L_SHOULDER, L_ELBOW>,
        },
        BoneEstimator {
            bone: Bone::RightUpperArm,
            required: &[R_SHOULDER, R_ELBOW],
            visibility_gated: false,
            compute: limb::<R_SHOULDER, R_ELBOW>,
        },
        BoneEstimator {
            bone: Bone::LeftLowerArm,
            required: &[L_ELBOW, L_WRIST],
            visibility_gated: false,
            compute: limb::<L_ELBOW, L_WRIST>,
        },
        BoneEstimator {
            bone: Bone::RightLowerArm,
            required: &[R_ELBOW, R_WRIST],
            visibility_gated: false,
            compute: limb::<R_ELBOW, R_WRIST>,
        },
        BoneEstimator {
            bone: Bone::LeftHand,
            required: &[L_ELBOW, L_WRIST, L_INDEX],
            visibility_gated: true,
            compute: wrist::<L_ELBOW, L_WRIST, L_INDEX>,
        },
        BoneEstimator {
            bone: Bone::RightHand,
            required: &[R_ELBOW, R_WRIST, R_INDEX],
            visibility_gated: true,
            compute: wrist::<R_ELBOW, R_WRIST, R_INDEX>,
        },
        BoneEstimator {
            bone: Bone::LeftUpperLeg,
            required: &[L_HIP, R_HIP, L_KNEE],
            visibility_gated: false,
            compute: upper_leg::<L_HIP, L_KNEE>,
        },
        BoneEstimator {
            bone: Bone::RightUpperLeg,
            required: &[L_HIP, R_HIP, R_KNEE],
            visibility_gated: false,
            compute: upper_leg::<R_HIP, R_KNEE>,
        },
        BoneEstimator {
            bone: Bone::LeftLowerLeg,
            required: &[L_HIP, R_HIP, L_KNEE, L_ANKLE],
            visibility_gated: false,
            compute: lower_leg::<L_HIP, L_KNEE, L_ANKLE>,
        },
        BoneEstimator {
            bone: Bone::RightLowerLeg,
            required: &[L_HIP, R_HIP, R_KNEE, R_ANKLE],
            visibility_gated: false,
            compute: lower_leg::<R_HIP, R_KNEE, R_ANKLE>,
        },
    ]
}

fn look(forward: &Vector3<f32>, up: &Vector3<f32>) -> Result<UnitQuaternion<f32>, Skip> {
    look_rotation(forward, up).ok_or(Skip::DegenerateGeometry)
}

fn hip_line(input: &EstimatorInput<'_>) -> Result<Vector3<f32>, Skip> {
    Ok(input.point(L_HIP)? - input.point(R_HIP)?)
}

/// 腰の左右ラインを前方に見る
fn hips(input: &EstimatorInput<'_>) -> Result<UnitQuaternion<f32>, Skip> {
    look(&hip_line(input)?, &world_up())
}

fn chest(input: &EstimatorInput<'_>) -> Result<UnitQuaternion<f32>, Skip> {
    let shoulder_line = input.point(L_SHOULDER)? - input.point(R_SHOULDER)?;
    look(&shoulder_line, &world_up())
}

/// 腰の向き + 上体の前後の傾き
fn waist(input: &EstimatorInput<'_>) -> Result<UnitQuaternion<f32>, Skip> {
    let up = world_up();
    let lateral = direction(&hip_line(input)?).ok_or(Skip::DegenerateGeometry)?;
    let forward = lateral.cross(&up);
    let base = look(&forward, &up)?;

    let shoulder_mid = midpoint(&input.point(L_SHOULDER)?, &input.point(R_SHOULDER)?);
    let hip_mid = midpoint(&input.point(L_HIP)?, &input.point(R_HIP)?);
    let torso = direction(&(shoulder_mid - hip_mid)).ok_or(Skip::DegenerateGeometry)?;

    let bow = signed_angle(&up, &torso, &lateral);
    let tilt = UnitQuaternion::from_axis_angle(&Unit::new_unchecked(lateral), bow);
    Ok(tilt * base)
}

/// 耳のラインからヨー、耳と鼻の高さの差からピッチ
fn head(input: &EstimatorInput<'_>) -> Result<UnitQuaternion<f32>, Skip> {
    let nose = input.point(NOSE)?;
    let left_ear = input.point(L_EAR)?;
    let right_ear = input.point(R_EAR)?;

    let ear = left_ear - right_ear;
    if ear.x.hypot(ear.z) <= MIN_LENGTH {
        return Err(Skip::DegenerateGeometry);
    }
    let yaw = ear.z.atan2(ear.x);

    let ear_mid = midpoint(&left_ear, &right_ear);
    let pitch = ((ear_mid.y - nose.y) * input.head_pitch_gain)
        .clamp(-std::f32::consts::FRAC_PI_2, std::f32::consts::FRAC_PI_2);

    let q_yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw);
    let q_pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), pitch);
    Ok(q_yaw * q_pitch)
}

/// 始点から終点へ向け、補助軸はワールド上方向
fn limb<const FROM: usize, const TO: usize>(
    input: &EstimatorInput<'_>,
) -> Result<UnitQuaternion<f32>, Skip> {
    let dir = input.point(TO)? - input.point(FROM)?;
    look(&dir, &world_up())
}

/// 手首 → 人差し指を前方、肘 → 手首を補助軸にする
fn wrist<const ELBOW: usize, const WRIST: usize, const TIP: usize>(
    input: &EstimatorInput<'_>,
) -> Result<UnitQuaternion<f32>, Skip> {
    let wrist = input.point(WRIST)?;
    let dir = input.point(TIP)? - wrist;
    let up = wrist - input.point(ELBOW)?;
    look(&dir, &up)
}

/// 膝 → 腰を前方、腰ライン × 前方を補助軸にする
fn upper_leg<const HIP: usize, const KNEE: usize>(
    input: &EstimatorInput<'_>,
) -> Result<UnitQuaternion<f32>, Skip> {
    let dir = direction(&(input.point(HIP)? - input.point(KNEE)?))
        .ok_or(Skip::DegenerateGeometry)?;
    let up = direction(&hip_line(input)?.cross(&dir)).unwrap_or_else(world_up);
    look(&dir, &up)
}

/// 膝 → 足首を前方、腰-膝-足首の平面法線を補助軸にする
///
/// 脚がまっすぐで平面が決まらないときは腰ライン、それも使えなければワールド上方向。
fn lower_leg<const HIP: usize, const KNEE: usize, const ANKLE: usize>(
    input: &EstimatorInput<'_>,
) -> Result<UnitQuaternion<f32>, Skip> {
    let hip = input.point(HIP)?;
    let knee = input.point(KNEE)?;
    let ankle = input.point(ANKLE)?;

    let thigh = knee - hip;
    let shin = ankle - knee;
    let dir = direction(&shin).ok_or(Skip::DegenerateGeometry)?;

    let candidates = [thigh.cross(&shin), hip_line(input)?, world_up()];
    candidates
        .iter()
        .filter_map(|up| direction(up))
        .find_map(|up| look_rotation(&dir, &up))
        .ok_or(Skip::DegenerateGeometry)
}
