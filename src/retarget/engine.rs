use nalgebra::{UnitQuaternion, Vector3};

use super::correction::RestPoseCorrections;
use super::estimators::{standard_estimators, BoneEstimator, EstimatorInput, Skip};
use super::root::{RootReference, RootTracker, HIP_INDICES};
use super::smooth::{blend_factor, blend_position, blend_rotation};
use crate::config::RetargetConfig;
use crate::landmark::{LandmarkSet, LandmarkSnapshot, PoseIndex};
use crate::rig::{Bone, Skeleton};

/// 1フレーム分の目標（補正済み、スムージング前）
#[derive(Debug, Clone, Default)]
pub struct PoseTargets {
    pub rotations: Vec<(Bone, UnitQuaternion<f32>)>,
    pub root_position: Option<Vector3<f32>>,
    pub skipped: Vec<(Bone, Skip)>,
    pub root_skipped: Option<Skip>,
}

impl PoseTargets {
    pub fn rotation(&self, bone: Bone) -> Option<UnitQuaternion<f32>> {
        self.rotations
            .iter()
            .find(|(b, _)| *b == bone)
            .map(|(_, q)| *q)
    }
}

/// `Retargeter::update` の結果
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// 使ったポーズスロットのバージョン
    pub pose_version: u64,
    pub applied: Vec<Bone>,
    pub skipped: Vec<(Bone, Skip)>,
    pub root_updated: bool,
}

/// ランドマークからボーン回転とルート位置を求め、スケルトンへ反映する
pub struct Retargeter {
    estimators: Vec<BoneEstimator>,
    corrections: RestPoseCorrections,
    root: RootTracker,
    smoothing_rate: f32,
    visibility_threshold: f32,
    gate_all_bones: bool,
    flip_y: bool,
    head_pitch_gain: f32,
}

impl Retargeter {
    pub fn new(config: &RetargetConfig) -> Self {
        let corrections =
            RestPoseCorrections::for_t_pose(config.flip_y).with_overrides(&config.corrections);
        Self::with_corrections(config, corrections)
    }

    pub fn with_corrections(config: &RetargetConfig, corrections: RestPoseCorrections) -> Self {
        let estimators = standard_estimators();
        let gated: Vec<&str> = estimators
            .iter()
            .filter(|e| e.visibility_gated || config.gate_all_bones)
            .map(|e| e.bone.name())
            .collect();
        log::info!(
            "Retargeter: smoothing={:.1}/s scale={:.2} visibility>={:.2} gated=[{}]",
            config.smoothing_rate,
            config.world_scale,
            config.visibility_threshold,
            gated.join(", ")
        );

        Self {
            estimators,
            corrections,
            root: RootTracker::new(config.world_scale),
            smoothing_rate: config.smoothing_rate,
            visibility_threshold: config.visibility_threshold,
            gate_all_bones: config.gate_all_bones,
            flip_y: config.flip_y,
            head_pitch_gain: config.head_pitch_gain,
        }
    }

    pub fn corrections(&self) -> &RestPoseCorrections {
        &self.corrections
    }

    pub fn root_reference(&self) -> Option<&RootReference> {
        self.root.reference()
    }

    /// 現在のフレームを基準姿勢として補正を取り直す
    ///
    /// ルート基準はセッション中に一度だけ取るので、ここでは触らない。
    pub fn calibrate(&mut self, pose: &LandmarkSet) -> Vec<(Bone, Skip)> {
        let input = self.input(pose);
        let (corrections, skipped) = RestPoseCorrections::calibrate(&self.estimators, &input);
        log::info!(
            "Calibrated {} of {} bones",
            Bone::COUNT - skipped.len(),
            Bone::COUNT
        );
        self.corrections = corrections;
        skipped
    }

    fn input<'a>(&self, pose: &'a LandmarkSet) -> EstimatorInput<'a> {
        EstimatorInput::new(pose, self.flip_y, self.head_pitch_gain)
    }

    /// 補正済みの目標回転とルート位置を求める
    ///
    /// 初回のルート基準はここで `skeleton` の現在位置から取る。
    pub fn targets<S: Skeleton + ?Sized>(&mut self, pose: &LandmarkSet, skeleton: &S) -> PoseTargets {
        let input = self.input(pose);
        let mut targets = PoseTargets::default();

        for e in &self.estimators {
            match e.estimate(&input, self.visibility_threshold, self.gate_all_bones) {
                Ok(raw) => targets
                    .rotations
                    .push((e.bone, raw * self.corrections.get(e.bone))),
                Err(skip) => targets.skipped.push((e.bone, skip)),
            }
        }

        let hidden_hip = HIP_INDICES
            .iter()
            .copied()
            .find(|&i| !pose.all_visible(&[i], self.visibility_threshold));
        if let (true, Some(index)) = (self.gate_all_bones, hidden_hip) {
            targets.root_skipped = Some(Skip::LowConfidence { index });
        } else {
            match self.root.target(pose, &skeleton.root_position()) {
                Ok(p) => targets.root_position = Some(p),
                Err(skip) => targets.root_skipped = Some(skip),
            }
        }

        targets
    }

    /// 最新スナップショットでスケルトンを1ティック進める
    ///
    /// 推定できなかったボーンは前の回転のまま残る。
    pub fn update<S: Skeleton + ?Sized>(
        &mut self,
        snapshot: &LandmarkSnapshot,
        skeleton: &mut S,
        dt: f32,
    ) -> TickReport {
        let targets = self.targets(&snapshot.pose.landmarks, skeleton);
        let t = blend_factor(self.smoothing_rate, dt);

        let mut report = TickReport {
            pose_version: snapshot.pose.version,
            ..TickReport::default()
        };

        for (bone, target) in &targets.rotations {
            let current = skeleton.rotation(*bone);
            skeleton.set_rotation(*bone, blend_rotation(&current, target, t));
            report.applied.push(*bone);
        }

        if let Some(target) = targets.root_position {
            let current = skeleton.root_position();
            skeleton.set_root_position(blend_position(&current, &target, t));
            report.root_updated = true;
        }

        for (bone, skip) in &targets.skipped {
            match skip {
                Skip::LowConfidence { index } => log::trace!(
                    "{} skipped: {:?} below visibility threshold",
                    bone.name(),
                    PoseIndex::from_index(*index)
                ),
                _ => log::trace!("{} skipped: {}", bone.name(), skip),
            }
        }
        report.skipped = targets.skipped;
        report
    }
}
