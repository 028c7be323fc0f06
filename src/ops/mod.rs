pub mod generate;
pub mod worker;
