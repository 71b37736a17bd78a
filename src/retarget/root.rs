use nalgebra::Vector3;

use super::estimators::Skip;
use super::geometry::midpoint;
use crate::landmark::{LandmarkSet, PoseIndex};

const L_HIP: usize = PoseIndex::LeftHip.index();
const R_HIP: usize = PoseIndex::RightHip.index();

/// ルート位置に使うランドマーク
pub const HIP_INDICES: [usize; 2] = [L_HIP, R_HIP];

/// 最初の有効フレームで取る基準
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootReference {
    /// 腰中点（XZ のみ, Y=0）
    pub hip_midpoint: Vector3<f32>,
    /// その時点のスケルトンのルート位置
    pub position: Vector3<f32>,
}

/// 腰中点の水平移動をルート位置に反映する
#[derive(Debug, Clone)]
pub struct RootTracker {
    world_scale: f32,
    reference: Option<RootReference>,
}

impl RootTracker {
    pub fn new(world_scale: f32) -> Self {
        Self {
            world_scale,
            reference: None,
        }
    }

    pub fn reference(&self) -> Option<&RootReference> {
        self.reference.as_ref()
    }

    /// 基準からの水平オフセット（Y は常に 0）
    ///
    /// カメラ座標と体の左右が逆なので符号を反転する。
    pub fn offset(&self, hip_midpoint: &Vector3<f32>) -> Vector3<f32> {
        match &self.reference {
            Some(r) => {
                let d = -(hip_midpoint - r.hip_midpoint) * self.world_scale;
                Vector3::new(d.x, 0.0, d.z)
            }
            None => Vector3::zeros(),
        }
    }

    /// ルートの目標位置。初回は基準を取って現在位置を返す
    pub fn target(
        &mut self,
        landmarks: &LandmarkSet,
        current_position: &Vector3<f32>,
    ) -> Result<Vector3<f32>, Skip> {
        let mid = hip_midpoint(landmarks)?;
        let reference = *self.reference.get_or_insert_with(|| {
            log::info!(
                "Root reference captured: hip=({:.3}, {:.3}) root=({:.3}, {:.3}, {:.3})",
                mid.x,
                mid.z,
                current_position.x,
                current_position.y,
                current_position.z
            );
            RootReference {
                hip_midpoint: mid,
                position: *current_position,
            }
        });
        Ok(reference.position + self.offset(&mid))
    }
}

/// 左右の腰の中点を XZ 平面に落とす
pub fn hip_midpoint(landmarks: &LandmarkSet) -> Result<Vector3<f32>, Skip> {
    let (Some(l), Some(r)) = (landmarks.get(L_HIP), landmarks.get(R_HIP)) else {
        return Err(Skip::InsufficientLandmarks {
            required: R_HIP + 1,
            available: landmarks.len(),
        });
    };
    let mid = midpoint(&l.position(), &r.position());
    if !(mid.x.is_finite() && mid.z.is_finite()) {
        return Err(Skip::DegenerateGeometry);
    }
    Ok(Vector3::new(mid.x, 0.0, mid.z))
}
