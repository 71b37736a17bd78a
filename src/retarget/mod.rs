pub mod correction;
pub mod engine;
pub mod estimators;
pub mod geometry;
pub mod rest_pose;
pub mod root;
pub mod smooth;

pub use correction::{euler_degrees, RestPoseCorrections};
pub use engine::{PoseTargets, Retargeter, TickReport};
pub use estimators::{standard_estimators, BoneEstimator, EstimatorInput, Skip};
pub use rest_pose::t_pose;
pub use root::{RootReference, RootTracker};
