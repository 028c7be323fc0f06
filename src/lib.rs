#![allow(clippy::too_many_arguments)]

pub mod app;
pub mod assets;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod logger;
pub mod ops;
