pub mod clock;
pub mod drive;
pub mod encoders;
