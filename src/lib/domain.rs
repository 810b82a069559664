pub mod clock;
pub mod labs;
