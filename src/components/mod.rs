pub mod history;
pub mod layers;
pub mod path;
pub mod styles;
pub mod tools;
