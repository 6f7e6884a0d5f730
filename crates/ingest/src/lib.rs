pub mod device;
pub mod paginate;
pub mod source;
pub mod sync;
pub mod transform;
