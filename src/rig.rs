//! Humanoid bone identifiers and the skeleton sink the retargeter writes into.

use nalgebra::{UnitQuaternion, Vector3};

/// リターゲット対象のボーン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bone {
    Hips,
    Spine,
    Chest,
    Head,
    LeftUpperArm,
    RightUpperArm,
    LeftLowerArm,
    RightLowerArm,
    LeftHand,
    RightHand,
    LeftUpperLeg,
    RightUpperLeg,
    LeftLowerLeg,
    RightLowerLeg,
}

impl Bone {
    pub const COUNT: usize = 14;

    pub const ALL: [Bone; Self::COUNT] = [
        Bone::Hips,
        Bone::Spine,
        Bone::Chest,
        Bone::Head,
        Bone::LeftUpperArm,
        Bone::RightUpperArm,
        Bone::LeftLowerArm,
        Bone::RightLowerArm,
        Bone::LeftHand,
        Bone::RightHand,
        Bone::LeftUpperLeg,
        Bone::RightUpperLeg,
        Bone::LeftLowerLeg,
        Bone::RightLowerLeg,
    ];

    /// Unity HumanBodyBones 名（VMC・設定ファイルで使用）
    pub fn name(self) -> &'static str {
        match self {
            Bone::Hips => "Hips",
            Bone::Spine => "Spine",
            Bone::Chest => "Chest",
            Bone::Head => "Head",
            Bone::LeftUpperArm => "LeftUpperArm",
            Bone::RightUpperArm => "RightUpperArm",
            Bone::LeftLowerArm => "LeftLowerArm",
            Bone::RightLowerArm => "RightLowerArm",
            Bone::LeftHand => "LeftHand",
            Bone::RightHand => "RightHand",
            Bone::LeftUpperLeg => "LeftUpperLeg",
            Bone::RightUpperLeg => "RightUpperLeg",
            Bone::LeftLowerLeg => "LeftLowerLeg",
            Bone::RightLowerLeg => "RightLowerLeg",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// ホスト側スケルトンへの書き込み口
///
/// 現在の回転がスムージングの状態を兼ねる。
pub trait Skeleton {
    fn rotation(&self, bone: Bone) -> UnitQuaternion<f32>;
    fn set_rotation(&mut self, bone: Bone, rotation: UnitQuaternion<f32>);
    fn root_position(&self) -> Vector3<f32>;
    fn set_root_position(&mut self, position: Vector3<f32>);
}

/// メモリ上の最小スケルトン
#[derive(Debug, Clone, PartialEq)]
pub struct Rig {
    rotations: [UnitQuaternion<f32>; Bone::COUNT],
    root_position: Vector3<f32>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_root(Vector3::zeros())
    }

    pub fn with_root(root_position: Vector3<f32>) -> Self {
        Self {
            rotations: [UnitQuaternion::identity(); Bone::COUNT],
            root_position,
        }
    }

    pub fn bones(&self) -> impl Iterator<Item = (Bone, UnitQuaternion<f32>)> + '_ {
        Bone::ALL.iter().map(move |&b| (b, self.rotations[b.slot()]))
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}

impl Skeleton for Rig {
    fn rotation(&self, bone: Bone) -> UnitQuaternion<f32> {
        self.rotations[bone.slot()]
    }

    fn set_rotation(&mut self, bone: Bone, rotation: UnitQuaternion<f32>) {
        self.rotations[bone.slot()] = rotation;
    }

    fn root_position(&self) -> Vector3<f32> {
        self.root_position
    }

    fn set_root_position(&mut self, position: Vector3<f32>) {
        self.root_position = position;
    }
}
