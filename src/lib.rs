pub mod assemble;
pub mod bazel;
pub mod bep;
pub mod builder;
pub mod cli;
pub mod config;
pub mod constraint;
pub mod driver;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod golist;
pub mod harvest;
pub mod logging;
pub mod pattern;
pub mod resolver;
pub mod schema;
pub mod util;
pub mod workspace;
