#![doc = include_str!("../README.md")]
pub mod configuration;
pub mod differential_controller;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod localisation;
pub mod logging;
pub mod map;
pub mod navigation;
pub mod path_finder;
pub mod pid;
pub mod vision;
