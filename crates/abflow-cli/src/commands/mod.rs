pub mod hlt;
pub mod qv;
pub mod run;
pub mod weights;
