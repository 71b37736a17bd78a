pub mod config;
pub mod landmark;
pub mod protocol;
pub mod receiver;
pub mod retarget;
pub mod rig;
pub mod vmc;
