use crate::landmark::{Landmark, LandmarkSet, PoseIndex};

/// 正面を向いて両腕を水平に広げた基準姿勢（画像座標, Y下向き）
///
/// 被写体の左側が画像の右（x が大きい側）に来る。手先は手首から少し下・前に
/// ずらしてあり、手首の推定が退化しない。
const T_POSE: [[f32; 3]; PoseIndex::COUNT] = [
    [0.50, 0.20, -0.05], // nose
    [0.51, 0.18, -0.04],
    [0.52, 0.18, -0.04],
    [0.53, 0.18, -0.04],
    [0.49, 0.18, -0.04],
    [0.48, 0.18, -0.04],
    [0.47, 0.18, -0.04],
    [0.55, 0.20, 0.00], // left ear
    [0.45, 0.20, 0.00], // right ear
    [0.51, 0.23, -0.04],
    [0.49, 0.23, -0.04],
    [0.60, 0.30, 0.00], // left shoulder
    [0.40, 0.30, 0.00],
    [0.72, 0.30, 0.00], // left elbow
    [0.28, 0.30, 0.00],
    [0.84, 0.30, 0.00], // left wrist
    [0.16, 0.30, 0.00],
    [0.87, 0.32, 0.00],
    [0.13, 0.32, 0.00],
    [0.88, 0.31, -0.01], // left index
    [0.12, 0.31, -0.01],
    [0.86, 0.29, -0.02],
    [0.14, 0.29, -0.02],
    [0.56, 0.55, 0.00], // left hip
    [0.44, 0.55, 0.00],
    [0.56, 0.72, 0.00], // left knee
    [0.44, 0.72, 0.00],
    [0.56, 0.90, 0.00], // left ankle
    [0.44, 0.90, 0.00],
    [0.56, 0.92, 0.02],
    [0.44, 0.92, 0.02],
    [0.57, 0.93, -0.05],
    [0.43, 0.93, -0.05],
];

/// 基準姿勢のランドマーク（可視性 0.99）
pub fn t_pose() -> LandmarkSet {
    T_POSE
        .iter()
        .map(|&[x, y, z]| Landmark::new(x, y, z, 0.99))
        .collect::<Vec<_>>()
        .into()
}
