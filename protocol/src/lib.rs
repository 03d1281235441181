pub mod blaster;
pub mod ir;
pub mod sensor;

pub use ir::Mode;
