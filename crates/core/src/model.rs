pub mod device;
pub mod labels;
pub mod sample;
pub mod silence;
