pub mod math;

pub use math::{BatchOp, DeviceMath, MatrixOp};
